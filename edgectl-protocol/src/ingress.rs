//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The protocol ingress handler, spec.md §4.4/§5: the south-bound
//! adapter's packet-in callback for frames addressed to the
//! orchestrator's DECOY endpoint. Validates the frame, then routes by
//! state: HREQ starts (or restarts) a Request and spawns the placement
//! coroutine; RRES/RCAN wake a waiting placement task via the
//! [`Rendezvous`], or, if none is waiting, answer a late reply with RCAN
//! (scenario 5 of spec.md §8); DACK/DCAN are annotated and passed
//! through to the Request's chosen host. Grounded in
//! `original_source/server/ryu_apps/protocol.py`'s `packet_in_handler`.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use edgectl_model::{CosRegistry, NodeRef};
use edgectl_selection::PathWeight;
use edgectl_topology::Topology;
use edgectl_utils::MacAddr;
use tracing::{debug, warn};

use crate::frame::{Frame, FrameState};
use crate::placement::{self, PlacementConfig, PlacementDeps};
use crate::rendezvous::Rendezvous;
use crate::requests::RequestStore;
use crate::southbound::SouthboundAdapter;

/// Addressing the frame validation of spec.md §4.4 checks against: the
/// orchestrator's virtual endpoint, and the "default" (unspecified)
/// address no real host should originate from.
#[derive(Clone, Copy, Debug)]
pub struct DecoyAddress {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// One south-bound packet-in event, already stripped of any L2/L3
/// framing the adapter itself understood. `ingress_dpid`/`in_port` are
/// where the frame arrived, used to reply to a sender with no known
/// topology attachment yet.
#[derive(Clone, Debug)]
pub struct PacketIn {
    pub ingress_dpid: String,
    pub in_port: u32,
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    pub ip_src: Ipv4Addr,
    pub ip_dst: Ipv4Addr,
    pub payload: Bytes,
}

/// Everything the ingress handler needs beyond the packet itself.
#[derive(Clone)]
pub struct IngressDeps {
    pub topology: Topology,
    pub requests: RequestStore,
    pub rendezvous: Rendezvous,
    pub southbound: Arc<dyn SouthboundAdapter>,
    pub cos_registry: CosRegistry,
    pub placement: PlacementDeps,
}

/// Returns whether `pkt` passes spec.md §4.4's frame validation: it
/// must be addressed to the orchestrator's DECOY MAC/IP, and must not
/// originate from the orchestrator itself or from the unspecified
/// address.
fn accepted(decoy: DecoyAddress, pkt: &PacketIn) -> bool {
    pkt.eth_dst == decoy.mac
        && pkt.ip_dst == decoy.ip
        && pkt.eth_src != decoy.mac
        && pkt.ip_src != Ipv4Addr::UNSPECIFIED
}

/// Handles one packet-in. Spawns its own background task for HREQ (the
/// placement coroutine runs independently of the ingress handler so a
/// slow candidate doesn't stall the next packet-in); every other state
/// is handled inline.
pub async fn handle(deps: IngressDeps, decoy: DecoyAddress, placement_config: PlacementConfig, pkt: PacketIn) {
    if !accepted(decoy, &pkt) {
        debug!(eth_src = %pkt.eth_src, ip_src = %pkt.ip_src, "dropping packet-in: fails frame validation");
        return;
    }

    let frame = match Frame::decode(&pkt.payload) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(%error, "dropping packet-in: malformed frame");
            return;
        }
    };

    match frame.state {
        FrameState::Hreq => handle_hreq(&deps, placement_config, &pkt, frame).await,
        FrameState::Rres | FrameState::Rcan => handle_reply(&deps, &pkt, frame).await,
        FrameState::Dack | FrameState::Dcan => handle_pass_through(&deps, frame).await,
        other => debug!(%other, "ignoring packet-in: not handled by the ingress path"),
    }
}

async fn handle_hreq(deps: &IngressDeps, placement_config: PlacementConfig, pkt: &PacketIn, frame: Frame) {
    let cos = frame.cos_id.and_then(|id| deps.cos_registry.get(id));
    if cos.is_none() {
        warn!(req_id = %frame.req_id, cos_id = ?frame.cos_id, "HREQ names an unknown CoS");
    }

    let started = deps
        .requests
        .begin_attempt(pkt.ip_src, &frame.req_id, NodeRef::Unknown(pkt.ip_src), cos, Utc::now())
        .await;
    let Some(_) = started else {
        debug!(req_id = %frame.req_id, "ignoring HREQ: an attempt is already in flight");
        return;
    };

    tokio::spawn(placement::run(
        deps.placement.clone(),
        placement_config,
        pkt.ip_src,
        pkt.eth_src,
        frame.req_id,
    ));
}

/// RRES/RCAN always target one particular candidate's rendezvous slot,
/// keyed by the replying host's own MAC. If nothing is waiting there —
/// the candidate already timed out, or (spec.md §8 scenario 5) another
/// candidate was already chosen — answer with RCAN so the replier
/// stops retrying.
async fn handle_reply(deps: &IngressDeps, pkt: &PacketIn, frame: Frame) {
    let delivered = deps.rendezvous.deliver(pkt.ip_src, &frame.req_id, pkt.eth_src, frame.clone()).await;
    if delivered {
        return;
    }

    debug!(req_id = %frame.req_id, host = %pkt.eth_src, "late reply with no waiting candidate; answering RCAN");
    let rcan = Frame::new(FrameState::Rcan, frame.req_id, frame.attempt_no);
    deps.southbound.packet_out(&pkt.ingress_dpid, pkt.in_port, rcan.encode().freeze()).await;
}

/// Forwards a DACK/DCAN to the Request's chosen host, filling in the
/// addressing fields from the Request record rather than trusting the
/// sender, spec.md §4.4's "DACK / DCAN pass-through".
async fn handle_pass_through(deps: &IngressDeps, frame: Frame) {
    let Some(src_ip) = frame.src_ip else {
        warn!(req_id = %frame.req_id, "dropping DACK/DCAN: no src_ip carried");
        return;
    };
    let Some(src_mac) = frame.src_mac else {
        warn!(req_id = %frame.req_id, "dropping DACK/DCAN: no src_mac carried");
        return;
    };

    let Some(req) = deps.requests.get(src_ip, &frame.req_id).await else {
        warn!(req_id = %frame.req_id, "dropping DACK/DCAN: unknown request");
        return;
    };
    let Some(host) = req.host else {
        warn!(req_id = %frame.req_id, "dropping DACK/DCAN: request has no chosen host yet");
        return;
    };
    let Some(node) = deps.topology.get_node(&host).await else {
        warn!(req_id = %frame.req_id, %host, "dropping DACK/DCAN: chosen host vanished from the topology");
        return;
    };
    let Some(main_if) = node.main_interface else {
        warn!(%host, "dropping DACK/DCAN: chosen host has no main interface");
        return;
    };
    let Some(iface) = deps.topology.get_interface(&host, &main_if).await else {
        warn!(%host, interface = %main_if, "dropping DACK/DCAN: main interface vanished");
        return;
    };
    let (Some(host_mac), Some(host_ip), Some((dpid, out_port))) = (iface.mac, iface.ipv4, iface.attached_to) else {
        warn!(%host, "dropping DACK/DCAN: chosen host's address or attachment is incomplete");
        return;
    };

    let mut out = Frame::new(frame.state, frame.req_id, frame.attempt_no);
    out.src_mac = Some(src_mac);
    out.src_ip = Some(src_ip);
    out.host_mac = Some(host_mac);
    out.host_ip = Some(host_ip);
    deps.southbound.packet_out(&dpid, out_port, out.encode().freeze()).await;
}

/// Default timeout applied to a single RREQ wait, used when no
/// configuration override is present (spec.md §6's `PROTOCOL_TIMEOUT`
/// default of 1 second).
pub const DEFAULT_PROTO_TIMEOUT: Duration = Duration::from_secs(1);

/// Default path weight, spec.md §6's `ORCHESTRATOR_PATH_WEIGHT` default.
pub const DEFAULT_PATH_WEIGHT: PathWeight = PathWeight::Hop;

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use edgectl_model::{Cos, CosSpecs, NodeType};
    use edgectl_selection::{NodeSelector, PathSelector};

    use super::*;
    use crate::l2::ManagedPairs;
    use crate::southbound::FlowMod;

    fn decoy() -> DecoyAddress {
        DecoyAddress { mac: MacAddr::from([0xde, 0xc0, 0, 0, 0, 1]), ip: Ipv4Addr::new(172, 16, 0, 1) }
    }

    #[derive(Default)]
    struct RecordingAdapter {
        sent: StdMutex<Vec<(String, u32, Frame)>>,
    }

    #[async_trait]
    impl SouthboundAdapter for RecordingAdapter {
        async fn packet_out(&self, dpid: &str, out_port: u32, payload: Bytes) {
            if let Ok(frame) = Frame::decode(&payload) {
                self.sent.lock().unwrap().push((dpid.to_string(), out_port, frame));
            }
        }
        async fn install_flow(&self, _flow: FlowMod) {}
        async fn delete_flow(&self, _dpid: &str, _ipv4_src: Ipv4Addr, _ipv4_dst: Ipv4Addr) {}
        async fn install_decoy_trap(&self, _dpid: &str, _decoy_ip: Ipv4Addr) {}
    }

    fn sample_packet(eth_src: MacAddr, ip_src: Ipv4Addr, frame: &Frame) -> PacketIn {
        PacketIn {
            ingress_dpid: "sw1".into(),
            in_port: 1,
            eth_src,
            eth_dst: decoy().mac,
            ip_src,
            ip_dst: decoy().ip,
            payload: frame.encode().freeze(),
        }
    }

    fn deps(topology: Topology, adapter: Arc<dyn SouthboundAdapter>) -> IngressDeps {
        let requests = RequestStore::new();
        let rendezvous = Rendezvous::new();
        let placement = PlacementDeps {
            topology: topology.clone(),
            node_selector: NodeSelector::default(),
            path_selector: PathSelector::default(),
            requests: requests.clone(),
            rendezvous: rendezvous.clone(),
            southbound: adapter.clone(),
            managed_pairs: ManagedPairs::new(),
        };
        IngressDeps {
            topology,
            requests,
            rendezvous,
            southbound: adapter,
            cos_registry: CosRegistry::new(vec![Cos { id: 1, name: "any".into(), specs: CosSpecs::default() }]),
            placement,
        }
    }

    fn placement_config() -> PlacementConfig {
        PlacementConfig {
            orchestrator_paths: false,
            path_weight: PathWeight::Hop,
            proto_timeout: Duration::from_millis(50),
            proto_retries: 1,
        }
    }

    #[tokio::test]
    async fn rejects_a_frame_not_addressed_to_the_decoy() {
        let topology = Topology::new();
        let recorder = Arc::new(RecordingAdapter::default());
        let adapter: Arc<dyn SouthboundAdapter> = recorder.clone();
        let d = deps(topology, adapter);

        let mut pkt = sample_packet(MacAddr::from([1, 1, 1, 1, 1, 1]), Ipv4Addr::new(10, 0, 0, 1), &Frame::new(FrameState::Hreq, "req-1", 0));
        pkt.eth_dst = MacAddr::from([9, 9, 9, 9, 9, 9]);
        handle(d, decoy(), placement_config(), pkt).await;

        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hreq_spawns_placement_which_reverts_with_no_hosts() {
        let topology = Topology::new();
        let adapter: Arc<dyn SouthboundAdapter> = Arc::new(RecordingAdapter::default());
        let d = deps(topology, adapter);

        let mut frame = Frame::new(FrameState::Hreq, "req-1", 0);
        frame.cos_id = Some(1);
        let pkt = sample_packet(MacAddr::from([1, 1, 1, 1, 1, 1]), Ipv4Addr::new(10, 0, 0, 1), &frame);
        let requests = d.requests.clone();
        handle(d, decoy(), placement_config(), pkt).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let req = requests.get(Ipv4Addr::new(10, 0, 0, 1), "req-1").await.unwrap();
        assert_eq!(req.state, edgectl_model::RequestState::Hreq);
    }

    #[tokio::test]
    async fn late_rres_with_no_waiter_gets_answered_with_rcan() {
        let topology = Topology::new();
        let adapter = Arc::new(RecordingAdapter::default());
        let d = deps(topology, adapter.clone());

        let mut rres = Frame::new(FrameState::Rres, "req-1", 0);
        rres.src_mac = Some(MacAddr::from([2, 2, 2, 2, 2, 2]));
        rres.src_ip = Some(Ipv4Addr::new(10, 0, 0, 1));
        let pkt = sample_packet(MacAddr::from([1, 1, 1, 1, 1, 1]), Ipv4Addr::new(10, 0, 0, 1), &rres);
        handle(d, decoy(), placement_config(), pkt).await;

        let sent = adapter.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2.state, FrameState::Rcan);
    }

    #[tokio::test]
    async fn dack_is_forwarded_to_the_chosen_host_with_addressing_filled_in() {
        let topology = Topology::new();
        topology.add_node("sw1".into(), true, NodeType::Switch, None, None).await.unwrap();
        topology.add_node("h1".into(), true, NodeType::Server, None, None).await.unwrap();
        topology
            .add_interface("h1", "h1-eth0".into(), None, Some(MacAddr::from([9, 9, 9, 9, 9, 9])), Some(Ipv4Addr::new(10, 0, 0, 9)))
            .await;
        topology.set_main_interface("h1", "h1-eth0").await;
        topology.set_interface_attachment("h1", "h1-eth0", "sw1", 3).await;

        let adapter = Arc::new(RecordingAdapter::default());
        let d = deps(topology, adapter.clone());
        let src_ip = Ipv4Addr::new(10, 0, 0, 1);
        d.requests
            .begin_attempt(src_ip, "req-1", NodeRef::Unknown(src_ip), None, Utc::now())
            .await
            .unwrap();
        d.requests.with_mut(src_ip, "req-1", |r| r.host = Some("h1".to_string())).await;

        let mut dack = Frame::new(FrameState::Dack, "req-1", 0);
        dack.src_mac = Some(MacAddr::from([1, 1, 1, 1, 1, 1]));
        dack.src_ip = Some(src_ip);
        handle_pass_through(&d, dack).await;

        let sent = adapter.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "sw1");
        assert_eq!(sent[0].1, 3);
        assert_eq!(sent[0].2.host_mac, Some(MacAddr::from([9, 9, 9, 9, 9, 9])));
    }
}
