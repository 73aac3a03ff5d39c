//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational state of a [`Link`], derived from per-port feature state
/// by the third State Updater tick loop (spec.md §4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[derive(Deserialize, Serialize)]
pub enum LinkState {
    Down,
    Blocked,
    Live,
}

impl LinkState {
    /// Whether traffic may be forwarded over a link in this state.
    pub fn is_usable(&self) -> bool {
        matches!(self, LinkState::Live)
    }
}

/// Resource readings for a directed [`Link`]. Per spec.md §3 invariant
/// (v): delay and jitter default to `+∞`, loss_rate defaults to `1.0`
/// (fully lossy / unusable until proven otherwise), and bandwidth
/// defaults to `0.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LinkSpecs {
    pub capacity: f64,
    pub bandwidth: f64,
    pub delay: f64,
    pub jitter: f64,
    pub loss_rate: f64,
    pub ts: Option<DateTime<Utc>>,
}

impl Default for LinkSpecs {
    fn default() -> Self {
        LinkSpecs {
            capacity: 0.0,
            bandwidth: 0.0,
            delay: f64::INFINITY,
            jitter: f64::INFINITY,
            loss_rate: 1.0,
            ts: None,
        }
    }
}

/// Field-wise update for [`LinkSpecs`], spec.md §4.2 (`update_link_specs`).
#[derive(Clone, Copy, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct LinkSpecsUpdate {
    pub capacity: Option<f64>,
    pub bandwidth: Option<f64>,
    pub delay: Option<f64>,
    pub jitter: Option<f64>,
    pub loss_rate: Option<f64>,
}

impl LinkSpecs {
    /// Applies `update` field-wise, respecting the monotonic-timestamp
    /// invariant (iii).
    pub fn apply(&mut self, update: &LinkSpecsUpdate, ts: DateTime<Utc>) -> bool {
        if let Some(current) = self.ts {
            if ts < current {
                return false;
            }
        }
        if let Some(v) = update.capacity {
            self.capacity = v;
        }
        if let Some(v) = update.bandwidth {
            self.bandwidth = v;
        }
        if let Some(v) = update.delay {
            self.delay = v;
        }
        if let Some(v) = update.jitter {
            self.jitter = v;
        }
        if let Some(v) = update.loss_rate {
            self.loss_rate = v;
        }
        self.ts = Some(ts);
        true
    }
}

/// A directed edge of the topology graph, from the `src` port to the
/// `dst` port it's addressed from. Invariant (i): both endpoint
/// interfaces must exist for a `Link` to exist. Invariant (iv):
/// `capacity = min(src_port.capacity, dst_port.capacity)`,
/// `bandwidth = min(src_port.bw_up, dst_port.bw_down)`.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Link {
    pub src_port: String,
    pub dst_port: String,
    pub state: LinkState,
    pub specs: LinkSpecs,
}

impl Link {
    pub fn new(src_port: String, dst_port: String, state: LinkState) -> Self {
        Link {
            src_port,
            dst_port,
            state,
            specs: LinkSpecs::default(),
        }
    }
}
