//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The State Updater itself: ties the topology to the collectors of
//! `window`, `port_stats`, `latency` and `link_state`, exposes the
//! north-bound-facing write API of spec.md §4.2 (`update_node_specs`,
//! `update_interface_specs`, `update_link_specs`), the south-bound
//! ingestion points that feed the three tick loops, and spawns those
//! loops at `MONITOR_PERIOD`, grounded in `original_source/server/
//! ryu_apps/topology_state.py` (the write API) and `network_monitor.py`
//! (the tick loops).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use edgectl_model::{InterfaceSpecsUpdate, LinkSpecsUpdate, NodeSpecsUpdate};
use edgectl_topology::{PortRef, Topology};
use edgectl_utils::IntervalTask;

use crate::latency::LatencyState;
use crate::link_state::{PortFeatureState, PortFeatureTracker};
use crate::port_stats::{self, PortCounters, PortStatsCollector};
use crate::window::Windows;

/// Default rolling window depth for port-stats samples (spec.md §4.2,
/// `MONITOR_SAMPLES`): the two most recent readings are enough to derive
/// a rate.
pub const MONITOR_SAMPLES: usize = 2;

/// Fuses monitor and client readings into a [`Topology`]. Cheap to
/// clone: internally an `Arc` over the collectors, mirroring
/// [`Topology`]'s own handle semantics.
pub struct StateUpdater {
    topology: Topology,
    period: Duration,
    windows: Mutex<Windows>,
    port_stats: Mutex<PortStatsCollector>,
    latency: Mutex<LatencyState>,
    features: Mutex<PortFeatureTracker>,
}

impl StateUpdater {
    pub fn new(topology: Topology, period: Duration) -> Arc<StateUpdater> {
        Arc::new(StateUpdater {
            topology,
            period,
            windows: Mutex::new(Windows::new()),
            port_stats: Mutex::new(PortStatsCollector::new(MONITOR_SAMPLES)),
            latency: Mutex::new(LatencyState::new()),
            features: Mutex::new(PortFeatureTracker::new()),
        })
    }

    // ===== north-bound-facing write API, spec.md §4.2 =====

    /// Applies a node specs reading (a client's own CPU/mem/disk report).
    pub async fn update_node_specs(
        &self,
        node_id: &str,
        update: NodeSpecsUpdate,
        ts: Option<DateTime<Utc>>,
    ) -> bool {
        self.topology
            .update_node_specs(node_id, update, ts.unwrap_or_else(Utc::now))
            .await
    }

    /// Applies an interface specs reading supplied through the north-bound
    /// API (as opposed to a south-bound port-stats sample). Opens
    /// `block_app_update` unconditionally, and `iperf3_update` in
    /// addition when `update.recv_bps` is set, so the monitor ticks don't
    /// immediately clobber this reading (spec.md §4.2).
    pub async fn update_interface_specs(
        &self,
        node_id: &str,
        name: &str,
        update: InterfaceSpecsUpdate,
        ts: Option<DateTime<Utc>>,
    ) -> bool {
        let ts = ts.unwrap_or_else(Utc::now);
        let has_recv_bps = update.recv_bps.is_some();
        let applied = self
            .topology
            .apply_interface_specs(node_id, name, &update, ts)
            .await;
        if applied {
            let mut windows = self.windows.lock().await;
            windows.open_block_app_update(node_id, name);
            if has_recv_bps {
                windows.open_iperf3_update(node_id, name);
            }
            drop(windows);
            self.topology.recompute_link_capacities(node_id, name).await;
        }
        applied
    }

    /// Applies a link specs reading supplied directly through the
    /// north-bound API.
    pub async fn update_link_specs(
        &self,
        src: &str,
        dst: &str,
        update: LinkSpecsUpdate,
        ts: Option<DateTime<Utc>>,
    ) -> bool {
        self.topology
            .apply_link_specs(src, dst, &update, ts.unwrap_or_else(Utc::now))
            .await
    }

    // ===== south-bound ingestion: ground truth that drives the ticks =====

    /// Records a port-stats-reply sample. The raw counters are stored on
    /// the interface unconditionally (ground truth, never suppressed);
    /// the derived bandwidth/loss only land on the next tick.
    pub async fn record_port_counters(
        &self,
        node_id: &str,
        name: &str,
        counters: PortCounters,
        ts: DateTime<Utc>,
    ) {
        self.port_stats.lock().await.record(node_id, name, counters, ts);
        let update = InterfaceSpecsUpdate {
            tx_packets: Some(counters.tx_packets),
            rx_packets: Some(counters.rx_packets),
            tx_bytes: Some(counters.tx_bytes),
            rx_bytes: Some(counters.rx_bytes),
            ..Default::default()
        };
        self.topology.apply_interface_specs(node_id, name, &update, ts).await;
    }

    /// Records a port-desc-stats-reply's nominal link capacity (Mbit/s).
    pub async fn record_port_capacity(&self, node_id: &str, name: &str, capacity_mbps: f64, ts: DateTime<Utc>) {
        let update = InterfaceSpecsUpdate {
            capacity: Some(capacity_mbps),
            ..Default::default()
        };
        if self.topology.apply_interface_specs(node_id, name, &update, ts).await {
            self.topology.recompute_link_capacities(node_id, name).await;
        }
    }

    /// Records an LLDP/echo-derived one-way switch↔switch delay.
    pub async fn record_switch_delay(&self, src: &str, dst: &str, delay: f64, ts: DateTime<Utc>) {
        self.latency.lock().await.record_switch_delay(src, dst, delay, ts);
    }

    /// Records a host↔switch round-trip measurement.
    pub async fn record_host_rtt(&self, host_id: &str, switch_id: &str, rtt: f64, ts: DateTime<Utc>) {
        self.latency.lock().await.record_host_rtt(host_id, switch_id, rtt, ts);
    }

    /// Records a port-desc-stats-reply's feature state.
    pub async fn set_port_feature_state(&self, node_id: &str, name: &str, state: PortFeatureState) {
        self.features.lock().await.set(node_id, name, state);
    }

    /// Drops all collected readings for a node that has left the
    /// topology (switch-leave or heartbeat prune).
    pub async fn forget_node(&self, node_id: &str) {
        self.port_stats.lock().await.forget_node(node_id);
        self.latency.lock().await.forget_node(node_id);
        self.features.lock().await.forget_node(node_id);
    }

    // ===== tick loops, spec.md §4.2 =====

    /// Spawns the three concurrent tick loops. Each ticks once per
    /// `period`, waiting a full period before its first run so the
    /// port-stats collector has a baseline sample (see
    /// [`edgectl_utils::IntervalTask::new`]'s `tick_on_start = false`).
    pub fn spawn_ticks(self: &Arc<StateUpdater>) -> (IntervalTask, IntervalTask, IntervalTask) {
        let period = self.period;

        let bw_loss = {
            let this = self.clone();
            IntervalTask::new(period, false, move || {
                let this = this.clone();
                async move { this.tick_bandwidth_loss().await }
            })
        };

        let delay_jitter = {
            let this = self.clone();
            IntervalTask::new(period, false, move || {
                let this = this.clone();
                async move { this.tick_delay_jitter().await }
            })
        };

        let link_state = {
            let this = self.clone();
            IntervalTask::new(period, false, move || {
                let this = this.clone();
                async move { this.tick_link_state().await }
            })
        };

        (bw_loss, delay_jitter, link_state)
    }

    /// First tick loop: derive free bandwidth and loss rate from port
    /// counters, skipping any `(node,port)` whose API-update or iperf
    /// window is currently open, grounded in
    /// `network_monitor.py::_port_stats_reply_handler` and
    /// `topology_state.py::_update_bandwidth_loss_rate`.
    async fn tick_bandwidth_loss(&self) {
        self.windows.lock().await.sweep_expired(self.period);

        let keys: Vec<(String, String)> = self
            .port_stats
            .lock()
            .await
            .keys()
            .cloned()
            .collect();

        for (node_id, port) in &keys {
            let blocked = {
                let windows = self.windows.lock().await;
                windows.is_app_update_blocked(node_id, port, self.period)
                    || windows.is_iperf_active(node_id, port, self.period)
            };
            if blocked {
                continue;
            }

            let Some(capacity) = self.topology.interface_specs(node_id, port).await.map(|s| s.capacity) else {
                continue;
            };
            let Some((tx_rate, rx_rate)) = self.port_stats.lock().await.byte_rate(node_id, port) else {
                continue;
            };
            let (bw_up, bw_down) = port_stats::derive_free_bandwidth(capacity, tx_rate, rx_rate);
            let update = InterfaceSpecsUpdate {
                bw_up: Some(bw_up),
                bw_down: Some(bw_down),
                ..Default::default()
            };
            if self
                .topology
                .apply_interface_specs(node_id, port, &update, Utc::now())
                .await
            {
                self.topology.recompute_link_capacities(node_id, port).await;
            }
        }

        for ((src, dst), link) in self.topology.get_links().await {
            let delta_tx = self.port_stats.lock().await.packet_delta(&src, &link.src_port);
            let delta_rx = self.port_stats.lock().await.packet_delta(&dst, &link.dst_port);
            let loss = match (delta_tx, delta_rx) {
                (Some((tx, _)), Some((_, rx))) => port_stats::derive_loss(tx, rx),
                _ => 1.0,
            };
            let update = LinkSpecsUpdate {
                loss_rate: Some(loss),
                ..Default::default()
            };
            self.topology.apply_link_specs(&src, &dst, &update, Utc::now()).await;
        }
    }

    /// Second tick loop: re-applies the latest known delay/jitter sample
    /// for every directed link, unconditionally (no freshness window —
    /// delay/jitter has no client-facing write path to race against),
    /// grounded in `topology_state.py::_update_delay_jitter`.
    async fn tick_delay_jitter(&self) {
        let readings = self.latency.lock().await.snapshot();
        for (src, dst, reading) in readings {
            let update = LinkSpecsUpdate {
                delay: Some(reading.delay),
                jitter: Some(reading.jitter),
                ..Default::default()
            };
            self.topology.apply_link_specs(&src, &dst, &update, reading.ts).await;
        }
    }

    /// Third tick loop: translates each known port feature state into the
    /// [`edgectl_model::LinkState`] of every link attached to that port,
    /// grounded in `topology_state.py::_update_link_state`.
    async fn tick_link_state(&self) {
        let snapshot = self.features.lock().await.snapshot();
        for (node_id, port, feature) in snapshot {
            let links = self
                .topology
                .get_links_at_port(&node_id, PortRef::Name(&port))
                .await;
            for ((src, dst), _) in links {
                self.topology.set_link_state(&src, &dst, feature.to_link_state()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgectl_model::NodeType;

    use super::*;

    async fn topology_with_switch(id: &str) -> Topology {
        let topology = Topology::new();
        topology
            .add_node(id.to_string(), true, NodeType::Switch, None, None)
            .await
            .unwrap();
        topology
            .add_interface(id, format!("{id}-eth1"), None, None, None)
            .await;
        topology
    }

    #[tokio::test]
    async fn recv_bps_opens_both_windows() {
        let topology = topology_with_switch("sw1").await;
        let updater = StateUpdater::new(topology.clone(), Duration::from_secs(5));
        updater
            .update_interface_specs(
                "sw1",
                "sw1-eth1",
                InterfaceSpecsUpdate { recv_bps: Some(900.0), ..Default::default() },
                Some(Utc::now()),
            )
            .await;
        let windows = updater.windows.lock().await;
        assert!(windows.is_app_update_blocked("sw1", "sw1-eth1", Duration::from_secs(5)));
        assert!(windows.is_iperf_active("sw1", "sw1-eth1", Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn plain_interface_update_opens_only_block_window() {
        let topology = topology_with_switch("sw1").await;
        let updater = StateUpdater::new(topology.clone(), Duration::from_secs(5));
        updater
            .update_interface_specs(
                "sw1",
                "sw1-eth1",
                InterfaceSpecsUpdate { capacity: Some(1000.0), ..Default::default() },
                Some(Utc::now()),
            )
            .await;
        let windows = updater.windows.lock().await;
        assert!(windows.is_app_update_blocked("sw1", "sw1-eth1", Duration::from_secs(5)));
        assert!(!windows.is_iperf_active("sw1", "sw1-eth1", Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn bandwidth_tick_skips_ports_inside_an_iperf_window() {
        let topology = topology_with_switch("sw1").await;
        let updater = StateUpdater::new(topology.clone(), Duration::from_secs(5));
        updater
            .update_interface_specs(
                "sw1",
                "sw1-eth1",
                InterfaceSpecsUpdate {
                    capacity: Some(1000.0),
                    recv_bps: Some(500.0),
                    ..Default::default()
                },
                Some(Utc::now()),
            )
            .await;
        updater
            .record_port_counters(
                "sw1",
                "sw1-eth1",
                PortCounters { tx_bytes: 1000, rx_bytes: 1000, ..Default::default() },
                Utc::now(),
            )
            .await;
        updater
            .record_port_counters(
                "sw1",
                "sw1-eth1",
                PortCounters { tx_bytes: 500_000, rx_bytes: 500_000, ..Default::default() },
                Utc::now() + chrono::Duration::seconds(1),
            )
            .await;

        updater.tick_bandwidth_loss().await;

        let specs = topology.interface_specs("sw1", "sw1-eth1").await.unwrap();
        // bw_up/bw_down should still be 0.0 (default): the iperf window
        // suppressed the derived write.
        assert_eq!(specs.bw_up, 0.0);
        assert_eq!(specs.bw_down, 0.0);
    }

    #[tokio::test]
    async fn link_state_tick_translates_feature_to_both_endpoint_links() {
        let topology = Topology::new();
        topology
            .add_node("sw1".to_string(), true, NodeType::Switch, None, None)
            .await
            .unwrap();
        topology
            .add_node("sw2".to_string(), true, NodeType::Switch, None, None)
            .await
            .unwrap();
        topology.add_interface("sw1", "sw1-eth1".to_string(), None, None, None).await;
        topology.add_interface("sw2", "sw2-eth1".to_string(), None, None, None).await;
        topology
            .add_link("sw1", "sw2", "sw1-eth1", "sw2-eth1", edgectl_model::LinkState::Live)
            .await;
        topology
            .add_link("sw2", "sw1", "sw2-eth1", "sw1-eth1", edgectl_model::LinkState::Live)
            .await;

        let updater = StateUpdater::new(topology.clone(), Duration::from_secs(5));
        updater.set_port_feature_state("sw1", "sw1-eth1", PortFeatureState::Blocked).await;
        updater.tick_link_state().await;

        let forward = topology.get_link("sw1", "sw2").await.unwrap();
        assert_eq!(forward.state, edgectl_model::LinkState::Blocked);
        let backward = topology.get_link("sw2", "sw1").await.unwrap();
        assert_eq!(backward.state, edgectl_model::LinkState::Blocked);
    }
}
