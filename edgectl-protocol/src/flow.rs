//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Flow-rule commitment, spec.md §4.5: given a chosen `path`, install
//! the forward and reverse flow entries at every switch hop. Grounded
//! in `original_source/server/ryu_apps/protocol.py`'s `_install_flows`/
//! `_send_flow_mod`, which special-case the first/inner/last/
//! same-switch positions; here every hop derives its `in_port`/
//! `out_port` uniformly from the two adjacent links, since the
//! topology graph already models host↔switch attachment as ordinary
//! links (the host-link stitcher of `edgectl-topology`), collapsing
//! those special cases into one loop.

use std::net::Ipv4Addr;

use edgectl_model::NodeId;
use edgectl_topology::Topology;
use tracing::warn;

use crate::southbound::{FlowMatch, FlowMod, SouthboundAdapter};

/// Flow-mod priority for a committed path entry, spec.md §4.5 (the
/// wildcard delete that precedes each install is priority 2 as well;
/// `SouthboundAdapter::install_flow` owns performing it).
pub const PATH_FLOW_PRIORITY: u16 = 2;

/// Installs both directions of `path` (`path[0] = src`, `path.last() =
/// host`) between `src_ip` and `host_ip`. A path shorter than 3 nodes
/// (no switch hop at all) installs nothing: there is no flow to commit
/// when source and host are the same node, and a direct host-host link
/// is not a topology this model admits.
pub async fn commit_path(
    topology: &Topology,
    southbound: &dyn SouthboundAdapter,
    path: &[NodeId],
    src_ip: Ipv4Addr,
    host_ip: Ipv4Addr,
) {
    if path.len() < 3 {
        warn!(hops = path.len(), "path too short to commit a flow");
        return;
    }
    install_direction(topology, southbound, path, src_ip, host_ip).await;
    let reversed: Vec<NodeId> = path.iter().rev().cloned().collect();
    install_direction(topology, southbound, &reversed, host_ip, src_ip).await;
}

/// Installs one direction's flow entries at every switch hop of
/// `nodes` (`nodes[0]` is the traffic's source node, `nodes.last()` its
/// destination), matching `ipv4_src -> ipv4_dst`.
async fn install_direction(
    topology: &Topology,
    southbound: &dyn SouthboundAdapter,
    nodes: &[NodeId],
    ipv4_src: Ipv4Addr,
    ipv4_dst: Ipv4Addr,
) {
    for i in 1..nodes.len() - 1 {
        let prev = &nodes[i - 1];
        let cur = &nodes[i];
        let next = &nodes[i + 1];

        let Some(in_link) = topology.get_link(prev, cur).await else {
            warn!(%prev, %cur, "cannot commit flow: missing link");
            return;
        };
        let Some(out_link) = topology.get_link(cur, next).await else {
            warn!(%cur, %next, "cannot commit flow: missing link");
            return;
        };

        let Some(in_port) = topology.get_interface(cur, &in_link.dst_port).await.and_then(|i| i.num) else {
            warn!(node = %cur, port = %in_link.dst_port, "cannot commit flow: in_port has no OpenFlow number");
            return;
        };
        let Some(out_port) = topology.get_interface(cur, &out_link.src_port).await.and_then(|i| i.num) else {
            warn!(node = %cur, port = %out_link.src_port, "cannot commit flow: out_port has no OpenFlow number");
            return;
        };

        southbound
            .install_flow(FlowMod {
                dpid: cur.clone(),
                priority: PATH_FLOW_PRIORITY,
                m: FlowMatch { in_port, ipv4_src, ipv4_dst },
                out_port,
            })
            .await;
    }
}
