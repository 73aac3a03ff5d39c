//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Freshness windows that let an API-supplied interface reading
//! suppress the monitor's own tick-derived writes for one period,
//! spec.md §4.2: `block_app_update` opens whenever `update_interface_specs`
//! is called through the north-bound API, and `iperf3_update` opens
//! additionally whenever that call carries `recv_bps` (an active
//! throughput measurement is in progress on that port, so capacity/
//! bw_{up,down} must not be re-derived from port counters). Both expire
//! one `MONITOR_PERIOD` after their last update.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use edgectl_model::NodeId;

type PortKey = (NodeId, String);

#[derive(Default)]
pub struct Windows {
    block_app_update: HashMap<PortKey, Instant>,
    iperf3_update: HashMap<PortKey, Instant>,
}

impl Windows {
    pub fn new() -> Self {
        Windows::default()
    }

    /// Opens (or refreshes) the `block_app_update` window for `(node,port)`.
    pub fn open_block_app_update(&mut self, node_id: &str, port: &str) {
        self.block_app_update
            .insert((node_id.to_string(), port.to_string()), Instant::now());
    }

    /// Opens (or refreshes) the `iperf3_update` window for `(node,port)`.
    pub fn open_iperf3_update(&mut self, node_id: &str, port: &str) {
        self.iperf3_update
            .insert((node_id.to_string(), port.to_string()), Instant::now());
    }

    /// Whether a monitor-derived write to `(node,port)` should be
    /// suppressed because an API update landed within the last period.
    pub fn is_app_update_blocked(&self, node_id: &str, port: &str, period: Duration) -> bool {
        self.block_app_update
            .get(&(node_id.to_string(), port.to_string()))
            .is_some_and(|opened| opened.elapsed() <= period)
    }

    /// Whether capacity/bw derivation from port counters should be
    /// skipped because an iperf window is active on `(node,port)`.
    pub fn is_iperf_active(&self, node_id: &str, port: &str, period: Duration) -> bool {
        self.iperf3_update
            .get(&(node_id.to_string(), port.to_string()))
            .is_some_and(|opened| opened.elapsed() <= period)
    }

    /// Drops windows that have expired, so the maps don't grow unbounded
    /// across a long-running orchestrator.
    pub fn sweep_expired(&mut self, period: Duration) {
        self.block_app_update.retain(|_, opened| opened.elapsed() <= period);
        self.iperf3_update.retain(|_, opened| opened.elapsed() <= period);
    }
}
