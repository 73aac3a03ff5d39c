//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use async_trait::async_trait;
use bytes::Bytes;
use edgectl_model::NodeId;

/// Match fields for a flow-mod, as derived from a path hop.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowMatch {
    pub in_port: u32,
    pub ipv4_src: Ipv4Addr,
    pub ipv4_dst: Ipv4Addr,
}

/// A single directional flow entry to install or delete on one switch.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowMod {
    pub dpid: NodeId,
    pub priority: u16,
    pub m: FlowMatch,
    pub out_port: u32,
}

/// Flow-mod priority for the decoy-trap rule installed on a switch's
/// first enter, spec.md §4.5: max priority, so it always wins over any
/// path-commitment entry at [`crate::flow::PATH_FLOW_PRIORITY`].
pub const DECOY_TRAP_PRIORITY: u16 = u16::MAX;

/// The boundary between the core and whatever actually speaks OpenFlow
/// to the switches. Not implemented by this crate: a real deployment
/// plugs in an adapter that talks to its own datapath runtime.
#[async_trait]
pub trait SouthboundAdapter: Send + Sync {
    /// Emits `payload` (an encoded [`crate::Frame`]) out of `dpid`'s
    /// `out_port`.
    async fn packet_out(&self, dpid: &str, out_port: u32, payload: Bytes);

    /// Installs a flow entry, preceded by the wildcard delete of any
    /// existing (ipv4_src,ipv4_dst,eth_type=IP) entry on the same switch
    /// at priority 2.
    async fn install_flow(&self, flow: FlowMod);

    /// Deletes a (ipv4_src,ipv4_dst) flow entry on `dpid`.
    async fn delete_flow(&self, dpid: &str, ipv4_src: Ipv4Addr, ipv4_dst: Ipv4Addr);

    /// Installs the [`DECOY_TRAP_PRIORITY`] rule matching
    /// `eth_type=IP, ipv4_dst=decoy_ip` -> CONTROLLER on `dpid`, spec.md
    /// §4.5. Unlike [`SouthboundAdapter::install_flow`] this has no
    /// `in_port`/`ipv4_src` restriction and no `out_port` (the action is
    /// "send to the controller", not to another switch port), so it
    /// can't be expressed as a [`FlowMod`].
    async fn install_decoy_trap(&self, dpid: &str, decoy_ip: Ipv4Addr);
}
