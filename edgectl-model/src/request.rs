//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Cos, NodeId};

/// A request's source, before and after it resolves to a known [`crate::Node`].
/// A host's first HREQ frame may arrive before it has ever registered
/// itself with the topology.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum NodeRef {
    Known(NodeId),
    Unknown(Ipv4Addr),
}

impl NodeRef {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            NodeRef::Known(id) => Some(id),
            NodeRef::Unknown(_) => None,
        }
    }
}

/// Request-level state, distinct from the frame-level protocol states of
/// `edgectl-protocol`. Transitions are gated by this state, not by a
/// frame alone, so late or duplicate frames can't corrupt a Request that
/// has already moved on (spec.md §9).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RequestState {
    Fail,
    Hreq,
    Rreq,
    Hres,
    Dreq,
    Dres,
}

impl RequestState {
    /// Wire value used for the request-level status exposed over REST,
    /// spec.md §6 ("request-level" state codes).
    pub fn code(&self) -> u8 {
        match self {
            RequestState::Fail => 0,
            RequestState::Hreq => 1,
            RequestState::Rreq => 3,
            RequestState::Dreq => 6,
            RequestState::Dres => 7,
            RequestState::Hres => 2,
        }
    }
}

/// A resource offer made by a candidate host in reply to an RREQ,
/// spec.md §3.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Response {
    pub req_id: String,
    pub src_ip: Ipv4Addr,
    pub attempt_no: u32,
    pub host: NodeId,
    pub algorithm: String,
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
    pub ts: DateTime<Utc>,
}

/// A selected network path for one attempt, with its per-hop qualities
/// so a sink can explain why it was chosen, spec.md §3.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Path {
    pub req_id: String,
    pub src_ip: Ipv4Addr,
    pub attempt_no: u32,
    pub host: NodeId,
    pub nodes: Vec<NodeId>,
    pub algorithm: String,
    pub weight_type: String,
    pub weight: f64,
    pub hop_bandwidth: Vec<f64>,
    pub hop_delay: Vec<f64>,
    pub hop_jitter: Vec<f64>,
    pub hop_loss_rate: Vec<f64>,
    pub ts: DateTime<Utc>,
}

impl Path {
    /// The last hop of the path, i.e. the chosen host, per spec.md §8's
    /// `r.path[-1] = r.host` testable property.
    pub fn last_hop(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }
}

/// One placement attempt for a [`Request`]. Attempts are appended
/// monotonically (never mutated in place once superseded), and each one
/// accumulates the [`Response`]s received from candidates during that
/// attempt's enumeration, spec.md §3.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Attempt {
    pub req_id: String,
    pub src_ip: Ipv4Addr,
    pub attempt_no: u32,
    pub host: Option<NodeId>,
    pub path: Option<Path>,
    pub state: RequestState,
    pub hreq_at: DateTime<Utc>,
    pub hres_at: Option<DateTime<Utc>>,
    pub rres_at: Option<DateTime<Utc>>,
    pub dres_at: Option<DateTime<Utc>>,
    pub responses: BTreeMap<Ipv4Addr, Response>,
}

impl Attempt {
    pub fn new(req_id: String, src_ip: Ipv4Addr, attempt_no: u32, hreq_at: DateTime<Utc>) -> Self {
        Attempt {
            req_id,
            src_ip,
            attempt_no,
            host: None,
            path: None,
            state: RequestState::Rreq,
            hreq_at,
            hres_at: None,
            rres_at: None,
            dres_at: None,
            responses: BTreeMap::new(),
        }
    }
}

/// A network-application placement request, spec.md §3. Owns the
/// monotonically-growing history of [`Attempt`]s made to satisfy it.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Request {
    pub id: String,
    pub src: NodeRef,
    pub cos: Option<Cos>,
    pub data: Option<Vec<u8>>,
    pub result: Option<Vec<u8>>,
    pub host: Option<NodeId>,
    pub path: Option<Path>,
    pub state: RequestState,
    pub hreq_at: DateTime<Utc>,
    pub dres_at: Option<DateTime<Utc>>,
    pub attempts: BTreeMap<u32, Attempt>,
}

impl Request {
    pub fn new(id: String, src: NodeRef, hreq_at: DateTime<Utc>) -> Self {
        Request {
            id,
            src,
            cos: None,
            data: None,
            result: None,
            host: None,
            path: None,
            state: RequestState::Hreq,
            hreq_at,
            dres_at: None,
            attempts: BTreeMap::new(),
        }
    }

    /// The most recent attempt, if any have been made.
    pub fn current_attempt(&self) -> Option<&Attempt> {
        self.attempts.values().next_back()
    }

    /// The most recent attempt, mutably.
    pub fn current_attempt_mut(&mut self) -> Option<&mut Attempt> {
        self.attempts.values_mut().next_back()
    }
}
