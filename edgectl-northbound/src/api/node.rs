//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! `POST /node`, `DELETE /node/{id}`, `PUT /node_specs/{id}`, spec.md §6.

use std::net::Ipv4Addr;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use edgectl_model::{InterfaceSpecsUpdate, NodeSpecsUpdate, NodeType};
use edgectl_utils::MacAddr;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/node", post(create_node))
        .route("/node/{id}", delete(delete_node))
        .route("/node_specs/{id}", put(update_node_specs))
}

#[derive(Debug, Deserialize)]
pub struct InterfaceBody {
    pub name: String,
    pub num: Option<u32>,
    pub mac: Option<String>,
    pub ipv4: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeBody {
    pub id: String,
    pub state: bool,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub label: Option<String>,
    pub threshold: Option<f64>,
    pub interfaces: Option<Vec<InterfaceBody>>,
    pub main_interface: Option<String>,
}

async fn create_node(
    State(state): State<AppState>,
    Json(body): Json<CreateNodeBody>,
) -> Result<StatusCode, ApiError> {
    let topology = state.topology();
    topology
        .add_node(body.id.clone(), body.state, body.kind, body.label, body.threshold)
        .await
        .map_err(|e| {
            e.log();
            ApiError::conflict(e.to_string())
        })?;

    for iface in body.interfaces.into_iter().flatten() {
        let mac = iface
            .mac
            .as_deref()
            .map(str::parse::<MacAddr>)
            .transpose()
            .map_err(|_| ApiError::bad_request(format!("malformed mac for interface '{}'", iface.name)))?;
        let ipv4 = iface
            .ipv4
            .as_deref()
            .map(str::parse::<Ipv4Addr>)
            .transpose()
            .map_err(|_| ApiError::bad_request(format!("malformed ipv4 for interface '{}'", iface.name)))?;
        if !topology.add_interface(&body.id, iface.name.clone(), iface.num, mac, ipv4).await {
            return Err(ApiError::internal(format!("failed to register interface '{}'", iface.name)));
        }
    }

    if let Some(name) = body.main_interface {
        if !topology.set_main_interface(&body.id, &name).await {
            return Err(ApiError::bad_request(format!("unknown main interface '{name}'")));
        }
    }

    Ok(StatusCode::OK)
}

async fn delete_node(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    if state.topology().delete_node(&id).await {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::not_found(format!("unknown node '{id}'")))
    }
}

#[derive(Debug, Deserialize)]
pub struct InterfaceSpecsBody {
    pub name: String,
    pub capacity: Option<f64>,
    pub bw_up: Option<f64>,
    pub bw_down: Option<f64>,
    pub tx_packets: Option<u64>,
    pub rx_packets: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_bytes: Option<u64>,
    #[serde(rename = "_recv_bps")]
    pub recv_bps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateNodeSpecsBody {
    pub cpu_count: Option<f64>,
    pub cpu_free: Option<f64>,
    pub mem_total: Option<f64>,
    pub mem_free: Option<f64>,
    pub disk_total: Option<f64>,
    pub disk_free: Option<f64>,
    pub interfaces: Option<Vec<InterfaceSpecsBody>>,
    pub ts: Option<DateTime<Utc>>,
}

async fn update_node_specs(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<UpdateNodeSpecsBody>,
) -> Result<StatusCode, ApiError> {
    if !state.topology().contains_node(&id).await {
        return Err(ApiError::not_found(format!("unknown node '{id}'")));
    }

    let update = NodeSpecsUpdate {
        cpu_count: body.cpu_count,
        cpu_free: body.cpu_free,
        mem_total: body.mem_total,
        mem_free: body.mem_free,
        disk_total: body.disk_total,
        disk_free: body.disk_free,
    };
    state.updater().update_node_specs(&id, update, body.ts).await;

    for iface in body.interfaces.into_iter().flatten() {
        let update = InterfaceSpecsUpdate {
            capacity: iface.capacity,
            bw_up: iface.bw_up,
            bw_down: iface.bw_down,
            tx_packets: iface.tx_packets,
            rx_packets: iface.rx_packets,
            tx_bytes: iface.tx_bytes,
            rx_bytes: iface.rx_bytes,
            recv_bps: iface.recv_bps,
        };
        if !state.updater().update_interface_specs(&id, &iface.name, update, body.ts).await {
            return Err(ApiError::bad_request(format!("unknown interface '{}' on node '{id}'", iface.name)));
        }
    }

    Ok(StatusCode::OK)
}
