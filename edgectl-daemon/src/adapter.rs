//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The only `SouthboundAdapter` implementation this workspace ships.
//! Spec.md §2/§4 treat the real south-bound runtime (an OpenFlow-style
//! datapath adapter) as an external collaborator consumed, not
//! implemented, by the core — a production deployment plugs in its own
//! adapter wired to the actual switches. This one exists so `edgectld`
//! is runnable and observable on its own: every packet-out, flow
//! install, and flow delete is logged at `debug` instead of reaching a
//! real datapath, the same role the `RecordingAdapter` test doubles
//! play in `edgectl-protocol`'s own test suites, just wired to tracing
//! instead of an in-memory `Vec`.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use bytes::Bytes;
use edgectl_protocol::{FlowMod, SouthboundAdapter};
use tracing::debug;

#[derive(Default)]
pub struct LoggingAdapter;

#[async_trait]
impl SouthboundAdapter for LoggingAdapter {
    async fn packet_out(&self, dpid: &str, out_port: u32, payload: Bytes) {
        debug!(%dpid, out_port, bytes = payload.len(), "packet-out (no datapath runtime attached)");
    }

    async fn install_flow(&self, flow: FlowMod) {
        debug!(dpid = %flow.dpid, priority = flow.priority, in_port = flow.m.in_port, out_port = flow.out_port, "install-flow (no datapath runtime attached)");
    }

    async fn delete_flow(&self, dpid: &str, ipv4_src: Ipv4Addr, ipv4_dst: Ipv4Addr) {
        debug!(%dpid, %ipv4_src, %ipv4_dst, "delete-flow (no datapath runtime attached)");
    }

    async fn install_decoy_trap(&self, dpid: &str, decoy_ip: Ipv4Addr) {
        debug!(%dpid, %decoy_ip, "install-decoy-trap (no datapath runtime attached)");
    }
}
