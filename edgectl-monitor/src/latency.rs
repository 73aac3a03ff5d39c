//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Delay/jitter derivation for spec.md §4.2's second tick loop, grounded
//! in `original_source/server/ryu_apps/protocol.py`'s
//! `_update_delay_jitter`: switch↔switch delay comes from an LLDP/echo
//! monitor and is applied directly per direction; host↔switch delay
//! comes from a one-way-trip host-delay monitor and is halved, then
//! applied symmetrically to both directions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use edgectl_model::NodeId;

type LinkKey = (NodeId, NodeId);

#[derive(Clone, Copy, Debug)]
pub struct LatencyReading {
    pub delay: f64,
    pub jitter: f64,
    pub ts: DateTime<Utc>,
}

/// Holds the most recent directed-link delay/jitter sample from each of
/// the two latency sources, applied to the topology every tick
/// regardless of whether a fresh sample arrived since the last one
/// (matching the original's unconditional per-tick re-application).
#[derive(Default)]
pub struct LatencyState {
    readings: HashMap<LinkKey, LatencyReading>,
    last_delay: HashMap<LinkKey, f64>,
}

impl LatencyState {
    pub fn new() -> Self {
        LatencyState::default()
    }

    /// Records a directly-measured switch↔switch delay (already
    /// one-way, per LLDP/echo convention) for the single direction
    /// `src -> dst`. Jitter is the absolute change from the previous
    /// reading on that direction.
    pub fn record_switch_delay(&mut self, src: &str, dst: &str, delay: f64, ts: DateTime<Utc>) {
        self.record(src, dst, delay, ts);
    }

    /// Records a round-trip host↔switch measurement and applies it,
    /// halved, to both directions (spec.md §4.2: "1-way = measured/2,
    /// applied symmetrically").
    pub fn record_host_rtt(&mut self, host_id: &str, switch_id: &str, rtt: f64, ts: DateTime<Utc>) {
        let one_way = rtt / 2.0;
        self.record(host_id, switch_id, one_way, ts);
        self.record(switch_id, host_id, one_way, ts);
    }

    fn record(&mut self, src: &str, dst: &str, delay: f64, ts: DateTime<Utc>) {
        let key = (src.to_string(), dst.to_string());
        let jitter = self
            .last_delay
            .get(&key)
            .map(|prev| (delay - prev).abs())
            .unwrap_or(0.0);
        self.last_delay.insert(key.clone(), delay);
        self.readings.insert(key, LatencyReading { delay, jitter, ts });
    }

    pub fn forget_node(&mut self, node_id: &str) {
        self.readings.retain(|(s, d), _| s != node_id && d != node_id);
        self.last_delay.retain(|(s, d), _| s != node_id && d != node_id);
    }

    /// Snapshot of every directed link with a known reading, for the
    /// tick loop to apply.
    pub fn snapshot(&self) -> Vec<(NodeId, NodeId, LatencyReading)> {
        self.readings
            .iter()
            .map(|((s, d), r)| (s.clone(), d.clone(), *r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn host_rtt_is_halved_and_applied_both_ways() {
        let mut state = LatencyState::new();
        state.record_host_rtt("h1", "sw1", 0.02, ts());
        let snap = state.snapshot();
        assert_eq!(snap.len(), 2);
        for (_, _, reading) in &snap {
            assert_eq!(reading.delay, 0.01);
        }
    }

    #[test]
    fn jitter_is_the_change_from_the_previous_sample() {
        let mut state = LatencyState::new();
        state.record_switch_delay("sw1", "sw2", 0.001, ts());
        state.record_switch_delay("sw1", "sw2", 0.004, ts());
        let (_, _, reading) = state
            .snapshot()
            .into_iter()
            .find(|(s, d, _)| s == "sw1" && d == "sw2")
            .unwrap();
        assert_eq!(reading.delay, 0.004);
        assert!((reading.jitter - 0.003).abs() < 1e-9);
    }
}
