//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Kind of entity a [`Node`] represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[derive(Deserialize, Serialize)]
pub enum NodeType {
    Server,
    Vm,
    IotObject,
    Gateway,
    Switch,
    Router,
}

impl NodeType {
    /// Switches are the only node kind born from south-bound events and
    /// pruned on switch-leave rather than on heartbeat timeout.
    pub fn is_switch(&self) -> bool {
        matches!(self, NodeType::Switch)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeType::Server => "SERVER",
            NodeType::Vm => "VM",
            NodeType::IotObject => "IOT_OBJECT",
            NodeType::Gateway => "GATEWAY",
            NodeType::Switch => "SWITCH",
            NodeType::Router => "ROUTER",
        };
        f.write_str(s)
    }
}

/// Administrative/operational state of a node. `true` means up/usable.
pub type NodeState = bool;

/// Resource readings for a [`Node`], fused from multiple sources by the
/// State Updater (`edgectl-monitor`). Per spec.md §3 invariant (v), the
/// "unknown quantity" defaults for a node's specs are plain zeros (a
/// freshly created node has no declared capacity until the first report
/// arrives); delay/jitter/loss defaults of invariant (v) apply to
/// [`crate::LinkSpecs`] instead.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NodeSpecs {
    pub cpu_count: f64,
    pub cpu_free: f64,
    pub mem_total: f64,
    pub mem_free: f64,
    pub disk_total: f64,
    pub disk_free: f64,
    pub ts: Option<DateTime<Utc>>,
}

/// Field-wise update for [`NodeSpecs`]; every field is optional so a
/// caller may update a subset without disturbing the rest, per spec.md
/// §4.2 (`update_node_specs`).
#[derive(Clone, Copy, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct NodeSpecsUpdate {
    pub cpu_count: Option<f64>,
    pub cpu_free: Option<f64>,
    pub mem_total: Option<f64>,
    pub mem_free: Option<f64>,
    pub disk_total: Option<f64>,
    pub disk_free: Option<f64>,
}

impl NodeSpecs {
    /// Applies `update` field-wise, respecting invariant (iii): the
    /// timestamp of a given owner never moves backward. Returns `false`
    /// (no-op) if `ts` is older than the current reading.
    pub fn apply(&mut self, update: NodeSpecsUpdate, ts: DateTime<Utc>) -> bool {
        if let Some(current) = self.ts {
            if ts < current {
                return false;
            }
        }
        if let Some(v) = update.cpu_count {
            self.cpu_count = v;
        }
        if let Some(v) = update.cpu_free {
            self.cpu_free = v;
        }
        if let Some(v) = update.mem_total {
            self.mem_total = v;
        }
        if let Some(v) = update.mem_free {
            self.mem_free = v;
        }
        if let Some(v) = update.disk_total {
            self.disk_total = v;
        }
        if let Some(v) = update.disk_free {
            self.disk_free = v;
        }
        self.ts = Some(ts);
        true
    }
}

/// A node in the network topology: a switch, host, or virtualized
/// endpoint. See spec.md §3.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeType,
    pub state: NodeState,
    pub label: Option<String>,
    /// Fraction of total capacity that must remain free for a placement to
    /// be admitted on this node; `1.0` means headroom enforcement is off
    /// (free must equal total), default per spec.md §4.1.
    pub threshold: f64,
    pub specs: NodeSpecs,
    pub main_interface: Option<String>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeType, state: NodeState) -> Self {
        Node {
            id,
            kind,
            state,
            label: None,
            threshold: 1.0,
            specs: NodeSpecs::default(),
            main_interface: None,
        }
    }
}
