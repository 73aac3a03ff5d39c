//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Host-link stitcher, spec.md §4.1: every second, look at every known
//! host interface whose attachment point (switch id, switch port number)
//! is recorded and whose owning switch is present in the graph, and
//! synthesize the two directed host↔switch links if they're missing.
//! Host interfaces never arrive carrying a [`edgectl_model::Link`] of
//! their own (no south-bound event creates one) — only the stitcher
//! does.

use std::time::Duration;

use edgectl_model::LinkState;
use edgectl_utils::task::IntervalTask;
use tracing::debug;

use crate::graph::Topology;

const STITCH_PERIOD: Duration = Duration::from_secs(1);

/// Spawns the 1 Hz stitcher loop. The returned handle cancels the loop
/// when dropped.
pub fn spawn(topology: Topology) -> IntervalTask {
    IntervalTask::new(STITCH_PERIOD, true, move || {
        let topology = topology.clone();
        async move {
            stitch_once(&topology).await;
        }
    })
}

async fn stitch_once(topology: &Topology) {
    for (host_id, host_iface, switch_id, switch_port_no) in topology.host_attachments().await {
        let Some(switch_iface) = find_switch_port(topology, &switch_id, switch_port_no).await
        else {
            continue;
        };

        if topology.get_link(&host_id, &switch_id).await.is_none() {
            debug!(host = %host_id, switch = %switch_id, "stitching host->switch link");
            topology
                .add_link(&host_id, &switch_id, &host_iface.name, &switch_iface, LinkState::Live)
                .await;
        }
        if topology.get_link(&switch_id, &host_id).await.is_none() {
            debug!(switch = %switch_id, host = %host_id, "stitching switch->host link");
            topology
                .add_link(&switch_id, &host_id, &switch_iface, &host_iface.name, LinkState::Live)
                .await;
        }
    }
}

/// Resolves the switch-side port name for a given port number, returning
/// `None` if the switch itself or that port hasn't been discovered yet
/// (e.g. the port-add event hasn't arrived).
async fn find_switch_port(topology: &Topology, switch_id: &str, port_no: u32) -> Option<String> {
    topology
        .get_interfaces(switch_id)
        .await
        .into_iter()
        .find(|iface| iface.num == Some(port_no))
        .map(|iface| iface.name)
}

#[cfg(test)]
mod tests {
    use edgectl_model::NodeType;

    use super::*;

    #[tokio::test]
    async fn stitches_bidirectional_links_once_both_sides_known() {
        let topo = Topology::new();
        topo.add_node("sw1".into(), true, NodeType::Switch, None, None)
            .await
            .unwrap();
        topo.add_node("h1".into(), true, NodeType::Server, None, None)
            .await
            .unwrap();
        topo.add_interface("sw1".into(), "sw1-eth3".into(), Some(3), None, None)
            .await;
        topo.add_interface("h1".into(), "h1-eth0".into(), None, None, None)
            .await;
        topo.set_interface_attachment("h1", "h1-eth0", "sw1".into(), 3)
            .await;

        stitch_once(&topo).await;

        assert!(topo.get_link("h1", "sw1").await.is_some());
        assert!(topo.get_link("sw1", "h1").await.is_some());
    }

    #[tokio::test]
    async fn does_not_stitch_until_switch_port_discovered() {
        let topo = Topology::new();
        topo.add_node("sw1".into(), true, NodeType::Switch, None, None)
            .await
            .unwrap();
        topo.add_node("h1".into(), true, NodeType::Server, None, None)
            .await
            .unwrap();
        topo.add_interface("h1".into(), "h1-eth0".into(), None, None, None)
            .await;
        topo.set_interface_attachment("h1", "h1-eth0", "sw1".into(), 3)
            .await;

        stitch_once(&topo).await;

        assert!(topo.get_link("h1", "sw1").await.is_none());
    }
}
