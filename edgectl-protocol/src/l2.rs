//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! L2 fallback forwarder, spec.md §4.6: used only when orchestrator-paths
//! are disabled. Computes a shortest host+switch path the first time a
//! `(src_mac, dst_mac)` pair is seen, installs it hop by hop, and floods
//! when the destination is unknown. Skips pairs the Host-Request
//! Protocol has claimed for itself (the `(src_mac,host_mac)` marking of
//! spec.md §4.4 step 4), and invalidates cached paths through a link
//! that later goes down. Grounded in
//! `original_source/server/ryu_apps/simple_switch_sp_13.py`.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use edgectl_model::NodeId;
use edgectl_topology::Topology;
use edgectl_utils::MacAddr;
use tracing::debug;

use crate::southbound::SouthboundAdapter;

type MacPair = (MacAddr, MacAddr);

/// The set of `(src_mac,dst_mac)` pairs the Host-Request Protocol has
/// committed an explicit path for; the L2 forwarder must not touch
/// traffic between them.
#[derive(Clone, Default)]
pub struct ManagedPairs {
    pairs: Arc<Mutex<HashSet<MacPair>>>,
}

impl ManagedPairs {
    pub fn new() -> Self {
        ManagedPairs::default()
    }

    pub fn mark(&self, src_mac: MacAddr, dst_mac: MacAddr) {
        self.pairs.lock().unwrap().insert((src_mac, dst_mac));
    }

    pub fn is_managed(&self, src_mac: MacAddr, dst_mac: MacAddr) -> bool {
        self.pairs.lock().unwrap().contains(&(src_mac, dst_mac))
    }
}

/// One cached hop: which switch to send out of, and on which port.
#[derive(Clone, Debug)]
pub struct Hop {
    pub dpid: NodeId,
    pub out_port: u32,
}

#[derive(Clone)]
struct CachedPath {
    hops: Vec<Hop>,
    /// The ipv4 pair the flows were matched on, if both endpoints had a
    /// known address at computation time; needed to delete the right
    /// flow entries on invalidation.
    ipv4: Option<(Ipv4Addr, Ipv4Addr)>,
}

#[derive(Default)]
struct PathCache {
    // (src_mac, dst_mac) -> ordered hops from the ingress switch onward
    paths: HashMap<MacPair, CachedPath>,
}

/// Background L2 app: one instance shared across every switch's
/// packet-in handler.
#[derive(Clone)]
pub struct L2Forwarder {
    topology: Topology,
    managed: ManagedPairs,
    cache: Arc<Mutex<PathCache>>,
}

impl L2Forwarder {
    pub fn new(topology: Topology, managed: ManagedPairs) -> Self {
        L2Forwarder { topology, managed, cache: Arc::new(Mutex::new(PathCache::default())) }
    }

    /// Handles one packet-in for an L2 frame (anything that isn't LLDP,
    /// ARP, or an orchestrator protocol frame). `ingress_dpid` is the
    /// switch the packet arrived on; if the destination's location is
    /// known, floods or forwards per the cached/derived path, otherwise
    /// floods.
    pub async fn handle(
        &self,
        southbound: &dyn SouthboundAdapter,
        ingress_dpid: &str,
        src_mac: MacAddr,
        dst_mac: MacAddr,
        payload: Bytes,
    ) {
        if self.managed.is_managed(src_mac, dst_mac) {
            debug!(%src_mac, %dst_mac, "skipping L2 forward: pair is protocol-managed");
            return;
        }

        let Some(entry) = self.topology.get_by_mac(dst_mac).await else {
            self.flood(southbound, ingress_dpid, payload).await;
            return;
        };

        let key = (src_mac, dst_mac);
        let cached = {
            let cache = self.cache.lock().unwrap();
            cache.paths.get(&key).map(|p| p.hops.clone())
        };
        let hops = match cached {
            Some(h) => h,
            None => {
                let Some(hops) = self.compute_path(ingress_dpid, &entry.node_id).await else {
                    self.flood(southbound, ingress_dpid, payload).await;
                    return;
                };
                let ipv4 = match (self.topology.get_by_mac(src_mac).await, self.topology.get_by_mac(dst_mac).await) {
                    (Some(s), Some(d)) => s.ipv4.zip(d.ipv4),
                    _ => None,
                };
                self.cache.lock().unwrap().paths.insert(key, CachedPath { hops: hops.clone(), ipv4 });
                hops
            }
        };

        if let Some(first) = hops.first() {
            southbound.packet_out(&first.dpid, first.out_port, payload).await;
        }
    }

    async fn compute_path(&self, from_dpid: &str, to_node: &str) -> Option<Vec<Hop>> {
        // Breadth-first search over the topology graph; good enough for
        // an L2 fallback whose only job is picking *a* working path.
        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        visited.insert(from_dpid.to_string());
        queue.push_back(from_dpid.to_string());

        while let Some(cur) = queue.pop_front() {
            if cur == to_node {
                break;
            }
            for (next, _) in self.topology.neighbors(&cur).await {
                if visited.insert(next.clone()) {
                    prev.insert(next.clone(), cur.clone());
                    queue.push_back(next);
                }
            }
        }

        if !visited.contains(to_node) {
            return None;
        }

        let mut nodes = vec![to_node.to_string()];
        let mut cur = to_node.to_string();
        while let Some(p) = prev.get(&cur) {
            nodes.push(p.clone());
            cur = p.clone();
        }
        nodes.reverse();

        let mut hops = Vec::new();
        for pair in nodes.windows(2) {
            let link = self.topology.get_link(&pair[0], &pair[1]).await?;
            let out_port = self.topology.get_interface(&pair[0], &link.src_port).await?.num?;
            hops.push(Hop { dpid: pair[0].clone(), out_port });
        }
        Some(hops)
    }

    async fn flood(&self, southbound: &dyn SouthboundAdapter, dpid: &str, payload: Bytes) {
        for iface in self.topology.get_interfaces(dpid).await {
            if let Some(num) = iface.num {
                southbound.packet_out(dpid, num, payload.clone()).await;
            }
        }
    }

    /// Invalidates every cached path that routes through `(src,dst)`,
    /// and deletes the flow entries that implemented it. Called when a
    /// link goes down (spec.md §4.6).
    pub async fn invalidate_link(&self, southbound: &dyn SouthboundAdapter, src: &str, dst: &str) {
        let stale: Vec<(MacPair, CachedPath)> = {
            let mut cache = self.cache.lock().unwrap();
            let keys: Vec<MacPair> = cache
                .paths
                .iter()
                .filter(|(_, p)| p.hops.iter().any(|h| h.dpid == src || h.dpid == dst))
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter().filter_map(|k| cache.paths.remove(&k).map(|p| (k, p))).collect()
        };

        for (_, path) in stale {
            let Some((ipv4_src, ipv4_dst)) = path.ipv4 else { continue };
            for hop in &path.hops {
                southbound.delete_flow(&hop.dpid, ipv4_src, ipv4_dst).await;
            }
        }
    }
}
