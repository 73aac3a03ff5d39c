//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-port counter collection and the bandwidth/loss derivation of
//! spec.md §4.2's first tick loop, grounded in `original_source/server/
//! ryu_apps/network_monitor.py`'s `port_stats`/`port_speed`/
//! `free_bandwidth` dictionaries (a rolling `MONITOR_SAMPLES`-deep
//! window of the two most recent port-stats-reply samples).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use edgectl_model::NodeId;

/// Raw tx/rx counters for one port, as reported by a south-bound
/// port-stats-reply event.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortCounters {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

type PortKey = (NodeId, String);

/// Rolling window of the `samples` most recent counter readings per
/// (node, port), default `MONITOR_SAMPLES = 2`.
pub struct PortStatsCollector {
    history: HashMap<PortKey, VecDeque<(PortCounters, DateTime<Utc>)>>,
    samples: usize,
}

impl PortStatsCollector {
    pub fn new(samples: usize) -> Self {
        PortStatsCollector {
            history: HashMap::new(),
            samples: samples.max(2),
        }
    }

    pub fn record(&mut self, node_id: &str, port: &str, counters: PortCounters, ts: DateTime<Utc>) {
        let key = (node_id.to_string(), port.to_string());
        let window = self.history.entry(key).or_default();
        window.push_back((counters, ts));
        while window.len() > self.samples {
            window.pop_front();
        }
    }

    pub fn forget_port(&mut self, node_id: &str, port: &str) {
        self.history.remove(&(node_id.to_string(), port.to_string()));
    }

    pub fn forget_node(&mut self, node_id: &str) {
        self.history.retain(|(id, _), _| id != node_id);
    }

    /// `(tx bytes/s, rx bytes/s)` derived from the two most recent
    /// samples at `(node,port)`, or `None` if fewer than two exist yet.
    pub fn byte_rate(&self, node_id: &str, port: &str) -> Option<(f64, f64)> {
        let window = self.history.get(&(node_id.to_string(), port.to_string()))?;
        let (prev, prev_ts) = window.iter().rev().nth(1)?;
        let (cur, cur_ts) = window.back()?;
        let period = (*cur_ts - *prev_ts).num_milliseconds() as f64 / 1000.0;
        if period <= 0.0 {
            return None;
        }
        let tx_rate = cur.tx_bytes.saturating_sub(prev.tx_bytes) as f64 / period;
        let rx_rate = cur.rx_bytes.saturating_sub(prev.rx_bytes) as f64 / period;
        Some((tx_rate, rx_rate))
    }

    /// `(Δtx_packets, Δrx_packets)` between the two most recent samples.
    pub fn packet_delta(&self, node_id: &str, port: &str) -> Option<(u64, u64)> {
        let window = self.history.get(&(node_id.to_string(), port.to_string()))?;
        let (prev, _) = window.iter().rev().nth(1)?;
        let (cur, _) = window.back()?;
        Some((
            cur.tx_packets.saturating_sub(prev.tx_packets),
            cur.rx_packets.saturating_sub(prev.rx_packets),
        ))
    }

    pub fn latest(&self, node_id: &str, port: &str) -> Option<PortCounters> {
        self.history
            .get(&(node_id.to_string(), port.to_string()))?
            .back()
            .map(|(c, _)| *c)
    }

    /// Every `(node, port)` pair with at least one recorded sample.
    pub fn keys(&self) -> impl Iterator<Item = &PortKey> {
        self.history.keys()
    }
}

/// Free up/down bandwidth (Mbit/s) for a port whose nominal `capacity`
/// (Mbit/s) and measured tx/rx byte rates (bytes/s) are known.
pub fn derive_free_bandwidth(capacity_mbps: f64, tx_bytes_per_sec: f64, rx_bytes_per_sec: f64) -> (f64, f64) {
    let up = (capacity_mbps - tx_bytes_per_sec * 8.0 / 1e6).max(0.0);
    let down = (capacity_mbps - rx_bytes_per_sec * 8.0 / 1e6).max(0.0);
    (up, down)
}

/// Directed-link loss rate from the tx-packet delta at the source port
/// and the rx-packet delta at the destination port over the same tick
/// interval, spec.md §4.2: `loss = max(0,(Δtx−Δrx)/Δtx)`; `Δtx=0` (or a
/// missing counter, modeled by the caller never calling this) yields 1.
pub fn derive_loss(delta_tx: u64, delta_rx: u64) -> f64 {
    if delta_tx == 0 {
        return 1.0;
    }
    ((delta_tx as f64 - delta_rx as f64) / delta_tx as f64).max(0.0)
}
