//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Heartbeat pruning loop, spec.md §4.1/§6: any non-switch node whose id
//! has not pinged within `UDP_TIMEOUT` is removed from the topology. The
//! actual heartbeat bookkeeping (receiving UDP datagrams, stamping
//! `clients[id] = now`) lives in `edgectl-protocol::registry::Registry`;
//! this module only owns the periodic prune against that registry.

use std::sync::Arc;
use std::time::Duration;

use edgectl_model::NodeType;
use edgectl_utils::task::IntervalTask;
use tracing::info;

use crate::graph::Topology;

/// Anything that can answer "when did this node id last heartbeat?",
/// implemented by `edgectl-protocol::registry::Registry`. Kept as a
/// trait here so `edgectl-topology` doesn't depend on `edgectl-protocol`
/// (the dependency would be circular: the protocol crate needs the
/// topology to place requests).
pub trait HeartbeatSource: Send + Sync {
    fn last_seen(&self, node_id: &str) -> Option<std::time::Instant>;
}

/// Spawns the heartbeat-timeout prune loop, ticking at `timeout`
/// (spec.md §5: "heartbeat checker — writer, heartbeat-timeout Hz").
pub fn spawn(
    topology: Topology,
    registry: Arc<dyn HeartbeatSource>,
    timeout: Duration,
) -> IntervalTask {
    IntervalTask::new(timeout, true, move || {
        let topology = topology.clone();
        let registry = registry.clone();
        async move {
            prune_once(&topology, registry.as_ref(), timeout).await;
        }
    })
}

async fn prune_once(topology: &Topology, registry: &dyn HeartbeatSource, timeout: Duration) {
    let now = std::time::Instant::now();
    for node in topology.get_nodes().await {
        if node.kind.is_switch() {
            continue;
        }
        let stale = match registry.last_seen(&node.id) {
            Some(last) => now.duration_since(last) > timeout,
            None => true,
        };
        if stale {
            info!(node = %node.id, "pruning node: heartbeat timeout");
            topology.delete_node(&node.id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    struct FakeRegistry(Mutex<HashMap<String, std::time::Instant>>);

    impl HeartbeatSource for FakeRegistry {
        fn last_seen(&self, node_id: &str) -> Option<std::time::Instant> {
            self.0.lock().unwrap().get(node_id).copied()
        }
    }

    #[tokio::test]
    async fn prunes_nodes_that_never_heartbeat() {
        let topo = Topology::new();
        topo.add_node("h1".into(), true, NodeType::Server, None, None)
            .await
            .unwrap();
        topo.add_node("sw1".into(), true, NodeType::Switch, None, None)
            .await
            .unwrap();

        let registry = FakeRegistry(Mutex::new(HashMap::new()));
        prune_once(&topo, &registry, Duration::from_secs(3)).await;

        assert!(!topo.contains_node("h1").await);
        assert!(topo.contains_node("sw1").await, "switches are pruned on leave events, not heartbeat");
    }

    #[tokio::test]
    async fn keeps_nodes_that_heartbeat_recently() {
        let topo = Topology::new();
        topo.add_node("h1".into(), true, NodeType::Server, None, None)
            .await
            .unwrap();

        let mut map = HashMap::new();
        map.insert("h1".to_string(), std::time::Instant::now());
        let registry = FakeRegistry(Mutex::new(map));
        prune_once(&topo, &registry, Duration::from_secs(3)).await;

        assert!(topo.contains_node("h1").await);
    }
}
