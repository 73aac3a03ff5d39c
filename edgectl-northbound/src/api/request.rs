//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! `POST /request`, spec.md §6. Requests normally enter through protocol
//! ingress (a host's HREQ frame); this endpoint lets a client register
//! one directly, e.g. to seed a Request made out-of-band.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use edgectl_model::{Attempt, NodeId, NodeRef, Request, RequestState, Response};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/request", post(create_request))
}

#[derive(Debug, Deserialize)]
pub struct AttemptBody {
    pub attempt_no: u32,
    pub host: Option<NodeId>,
    pub state: RequestState,
    pub hreq_at: DateTime<Utc>,
    pub hres_at: Option<DateTime<Utc>>,
    pub rres_at: Option<DateTime<Utc>>,
    pub dres_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responses: Vec<Response>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub id: String,
    pub src: NodeRef,
    pub cos_id: u32,
    pub data: Option<Vec<u8>>,
    pub result: Option<Vec<u8>>,
    pub host: Option<NodeId>,
    pub state: RequestState,
    pub hreq_at: DateTime<Utc>,
    pub dres_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: Vec<AttemptBody>,
}

/// Resolves the IPv4 address a Request is keyed under: directly, if
/// `src` already names it, or through the node's main interface if `src`
/// names a registered node (spec.md §3's `NodeRef::Known` case).
async fn resolve_src_ip(state: &AppState, src: &NodeRef) -> Result<Ipv4Addr, ApiError> {
    match src {
        NodeRef::Unknown(ip) => Ok(*ip),
        NodeRef::Known(id) => {
            let node = state
                .topology()
                .get_node(id)
                .await
                .ok_or_else(|| ApiError::not_found(format!("unknown node '{id}'")))?;
            let main = node
                .main_interface
                .as_ref()
                .ok_or_else(|| ApiError::bad_request(format!("node '{id}' has no main interface")))?;
            let iface = state
                .topology()
                .get_interface(id, main)
                .await
                .ok_or_else(|| ApiError::bad_request(format!("node '{id}' main interface '{main}' not found")))?;
            iface.ipv4.ok_or_else(|| ApiError::bad_request(format!("node '{id}' main interface has no ipv4")))
        }
    }
}

/// Resolves the responding host's own address, spec.md §3's "responses:
/// mapping host_ip→Response" — the map key is the candidate's address,
/// not the request's own `src_ip` carried on every `Response` record for
/// identification.
async fn response_host_ip(state: &AppState, response: &Response) -> Option<Ipv4Addr> {
    let node = state.topology().get_node(&response.host).await?;
    let main = node.main_interface?;
    state.topology().get_interface(&response.host, &main).await?.ipv4
}

async fn to_request(state: &AppState, body: CreateRequestBody, cos: Option<edgectl_model::Cos>, src_ip: Ipv4Addr) -> Request {
    let mut request = Request::new(body.id.clone(), body.src, body.hreq_at);
    request.cos = cos;
    request.data = body.data;
    request.result = body.result;
    request.host = body.host;
    request.state = body.state;
    request.dres_at = body.dres_at;

    for a in body.attempts {
        let mut attempt = Attempt::new(body.id.clone(), src_ip, a.attempt_no, a.hreq_at);
        attempt.host = a.host;
        attempt.state = a.state;
        attempt.hres_at = a.hres_at;
        attempt.rres_at = a.rres_at;
        attempt.dres_at = a.dres_at;

        let mut responses = BTreeMap::new();
        for response in a.responses {
            match response_host_ip(state, &response).await {
                Some(host_ip) => {
                    responses.insert(host_ip, response);
                }
                None => warn!(host = %response.host, "dropping response: host's address could not be resolved"),
            }
        }
        attempt.responses = responses;
        request.attempts.insert(a.attempt_no, attempt);
    }

    request
}

async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> Result<StatusCode, ApiError> {
    let src_ip = resolve_src_ip(&state, &body.src).await?;
    let cos = state.cos_registry().get(body.cos_id);
    let req_id = body.id.clone();
    let request = to_request(&state, body, cos, src_ip).await;

    if state.requests().put_if_absent(src_ip, &req_id, request).await {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::conflict(format!("request '{req_id}' already exists")))
    }
}
