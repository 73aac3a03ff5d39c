//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! South-bound topology events, spec.md §5/§2: the write side of the
//! Topology Service, symmetric to [`crate::ingress::handle`] on the
//! protocol-frame side. A real south-bound adapter decodes switch/port/
//! link/host add/delete/modify notifications off its datapath runtime
//! and drives [`handle`] with them; this module owns applying each one
//! to the [`Topology`] (and, on a switch's first enter, installing the
//! decoy-trap flow of spec.md §4.5). Grounded in
//! `original_source/server/ryu_apps/topology.py`'s `_switch_enter_handler`/
//! `_port_add_handler`/`_link_add_handler`/`_host_add_handler` family and
//! `protocol.py`'s `_switch_enter_handler`.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use edgectl_model::{LinkState, NodeId, NodeType};
use edgectl_topology::Topology;
use edgectl_utils::MacAddr;
use tracing::{debug, info, warn};

use crate::southbound::SouthboundAdapter;

/// A port discovered on a switch, carried by [`SouthboundEvent::SwitchEnter`]/
/// `PortAdd`/`PortModify`.
#[derive(Clone, Debug)]
pub struct PortDesc {
    pub name: String,
    pub num: u32,
}

/// One south-bound topology notification, spec.md §5's "south-bound
/// event handler (switch/port/link/host add/delete/modify)".
#[derive(Clone, Debug)]
pub enum SouthboundEvent {
    SwitchEnter { dpid: NodeId, active: bool, ports: Vec<PortDesc> },
    SwitchLeave { dpid: NodeId },
    PortAdd { dpid: NodeId, port: PortDesc },
    PortDelete { dpid: NodeId, name: String },
    PortModify { dpid: NodeId, port: PortDesc },
    LinkAdd { src: NodeId, dst: NodeId, src_port: String, dst_port: String },
    LinkDelete { src: NodeId, dst: NodeId },
    HostAdd { mac: MacAddr, dpid: NodeId, port_no: u32 },
    HostDelete { mac: MacAddr },
    HostMove { mac: MacAddr, dpid: NodeId, port_no: u32 },
}

/// Everything the topology-event handler needs beyond the event itself.
#[derive(Clone)]
pub struct TopologyEventDeps {
    pub topology: Topology,
    pub southbound: Arc<dyn SouthboundAdapter>,
    pub decoy_ip: Ipv4Addr,
}

/// Retry count and backoff applied to an event naming an entity the
/// topology doesn't know yet (spec.md §7: "Event for an unknown entity
/// (port-add arriving before its switch-enter): retry up to 3 times
/// with 1-second backoff; if still unresolved, drop and log"), grounded
/// in topology.py's `retry=3`/`sleep(1)` default on `_port_add_handler`
/// and `_link_add_handler`.
const EVENT_RETRIES: u32 = 3;
const EVENT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Retries `attempt` up to [`EVENT_RETRIES`] times, sleeping
/// [`EVENT_RETRY_BACKOFF`] between each, stopping as soon as it reports
/// success. Drops and logs once retries are exhausted.
async fn with_retry<F, Fut>(what: &str, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let mut retries_left = EVENT_RETRIES;
    loop {
        if attempt().await {
            return;
        }
        if retries_left == 0 {
            warn!(%what, "dropping south-bound event: entity still unresolved after retries");
            return;
        }
        retries_left -= 1;
        tokio::time::sleep(EVENT_RETRY_BACKOFF).await;
    }
}

/// Applies one south-bound topology event.
pub async fn handle(deps: &TopologyEventDeps, event: SouthboundEvent) {
    match event {
        SouthboundEvent::SwitchEnter { dpid, active, ports } => handle_switch_enter(deps, dpid, active, ports).await,
        SouthboundEvent::SwitchLeave { dpid } => {
            if deps.topology.delete_node(&dpid).await {
                info!(%dpid, "switch left: node removed");
            }
        }
        SouthboundEvent::PortAdd { dpid, port } => handle_port_add(deps, &dpid, port).await,
        SouthboundEvent::PortDelete { dpid, name } => {
            deps.topology.delete_interface(&dpid, &name).await;
        }
        SouthboundEvent::PortModify { dpid, port } => {
            // Grounded in topology.py's `_port_modify_handler`: delete then
            // re-add, the same retry policy as a fresh port-add.
            deps.topology.delete_interface(&dpid, &port.name).await;
            handle_port_add(deps, &dpid, port).await;
        }
        SouthboundEvent::LinkAdd { src, dst, src_port, dst_port } => {
            handle_link_add(deps, &src, &dst, &src_port, &dst_port).await;
        }
        SouthboundEvent::LinkDelete { src, dst } => {
            deps.topology.delete_link(&src, &dst).await;
        }
        SouthboundEvent::HostAdd { mac, dpid, port_no } => handle_host_attach(deps, mac, dpid, port_no).await,
        SouthboundEvent::HostDelete { mac } => {
            if let Some(entry) = deps.topology.get_by_mac(mac).await {
                deps.topology.clear_interface_attachment(&entry.node_id, &entry.port_name).await;
            }
        }
        SouthboundEvent::HostMove { mac, dpid, port_no } => {
            // Grounded in topology.py's `_host_move_handler`: delete then add.
            if let Some(entry) = deps.topology.get_by_mac(mac).await {
                deps.topology.clear_interface_attachment(&entry.node_id, &entry.port_name).await;
            }
            handle_host_attach(deps, mac, dpid, port_no).await;
        }
    }
}

/// Creates the switch node and its ports, grounded in protocol.py's
/// `_switch_enter_handler` (~line 237): on the *first* enter — the node
/// didn't already exist — also installs the priority-max decoy-trap
/// flow (eth_type=IP, ipv4_dst=DECOY_IP) -> CONTROLLER, so protocol
/// frames reach the orchestrator even before any Request flow is
/// committed (spec.md §4.5). A reconnecting switch still gets its ports
/// refreshed, but the trap isn't installed twice.
async fn handle_switch_enter(deps: &TopologyEventDeps, dpid: NodeId, active: bool, ports: Vec<PortDesc>) {
    let first_enter = deps
        .topology
        .add_node(dpid.clone(), active, NodeType::Switch, Some(dpid.clone()), None)
        .await
        .is_ok();

    for port in ports {
        deps.topology.add_interface(&dpid, port.name, Some(port.num), None, None).await;
    }

    if first_enter {
        info!(%dpid, "switch entered: installing decoy trap");
        deps.southbound.install_decoy_trap(&dpid, deps.decoy_ip).await;
    } else {
        debug!(%dpid, "switch re-entered: ports refreshed, decoy trap already installed");
    }
}

async fn handle_port_add(deps: &TopologyEventDeps, dpid: &str, port: PortDesc) {
    with_retry(&format!("port-add {dpid}/{}", port.name), || {
        let topology = deps.topology.clone();
        let dpid = dpid.to_string();
        let name = port.name.clone();
        let num = port.num;
        async move { topology.add_interface(&dpid, name, Some(num), None, None).await }
    })
    .await;
}

async fn handle_link_add(deps: &TopologyEventDeps, src: &str, dst: &str, src_port: &str, dst_port: &str) {
    with_retry(&format!("link-add {src}/{src_port} -> {dst}/{dst_port}"), || {
        let topology = deps.topology.clone();
        let (src, dst, src_port, dst_port) = (src.to_string(), dst.to_string(), src_port.to_string(), dst_port.to_string());
        // Links from a south-bound event always start DOWN, same as
        // topology.py's always-`state=False`; the link-state monitor tick
        // (edgectl-monitor) is the only writer that ever marks one Live.
        async move { topology.add_link(&src, &dst, &src_port, &dst_port, LinkState::Down).await }
    })
    .await;
}

/// Resolves `mac` to its registered interface and records that it is
/// attached behind `(dpid, port_no)`, consumed by the host-link
/// stitcher. The interface must already exist (from a prior `POST
/// /node` registration carrying that mac) — if it doesn't yet, this is
/// exactly spec.md §7's "event for an unknown entity" case.
async fn handle_host_attach(deps: &TopologyEventDeps, mac: MacAddr, dpid: NodeId, port_no: u32) {
    with_retry(&format!("host-attach {mac}"), || {
        let topology = deps.topology.clone();
        let dpid = dpid.clone();
        async move {
            let Some(entry) = topology.get_by_mac(mac).await else {
                return false;
            };
            topology.set_interface_attachment(&entry.node_id, &entry.port_name, dpid, port_no).await
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use edgectl_model::NodeType as ModelNodeType;

    use super::*;
    use crate::southbound::FlowMod;

    #[derive(Default)]
    struct RecordingAdapter {
        decoy_traps: Mutex<Vec<(String, Ipv4Addr)>>,
    }

    #[async_trait]
    impl SouthboundAdapter for RecordingAdapter {
        async fn packet_out(&self, _dpid: &str, _out_port: u32, _payload: Bytes) {}
        async fn install_flow(&self, _flow: FlowMod) {}
        async fn delete_flow(&self, _dpid: &str, _ipv4_src: Ipv4Addr, _ipv4_dst: Ipv4Addr) {}
        async fn install_decoy_trap(&self, dpid: &str, decoy_ip: Ipv4Addr) {
            self.decoy_traps.lock().unwrap().push((dpid.to_string(), decoy_ip));
        }
    }

    fn deps(adapter: Arc<RecordingAdapter>) -> TopologyEventDeps {
        TopologyEventDeps {
            topology: Topology::new(),
            southbound: adapter,
            decoy_ip: Ipv4Addr::new(172, 16, 0, 1),
        }
    }

    #[tokio::test]
    async fn switch_enter_creates_node_ports_and_installs_decoy_trap_once() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter.clone());

        handle(&deps, SouthboundEvent::SwitchEnter {
            dpid: "sw1".into(),
            active: true,
            ports: vec![PortDesc { name: "sw1-eth1".into(), num: 1 }],
        })
        .await;

        assert!(deps.topology.contains_node("sw1").await);
        assert_eq!(deps.topology.get_interface("sw1", "sw1-eth1").await.unwrap().num, Some(1));
        assert_eq!(adapter.decoy_traps.lock().unwrap().len(), 1);

        // A reconnect (switch already known) refreshes ports but does not
        // re-trap.
        handle(&deps, SouthboundEvent::SwitchEnter {
            dpid: "sw1".into(),
            active: true,
            ports: vec![PortDesc { name: "sw1-eth2".into(), num: 2 }],
        })
        .await;
        assert!(deps.topology.get_interface("sw1", "sw1-eth2").await.is_some());
        assert_eq!(adapter.decoy_traps.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn switch_leave_removes_the_node() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);
        handle(&deps, SouthboundEvent::SwitchEnter { dpid: "sw1".into(), active: true, ports: vec![] }).await;
        handle(&deps, SouthboundEvent::SwitchLeave { dpid: "sw1".into() }).await;
        assert!(!deps.topology.contains_node("sw1").await);
    }

    #[tokio::test]
    async fn port_add_succeeds_immediately_when_switch_is_known() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);
        deps.topology.add_node("sw1".into(), true, ModelNodeType::Switch, None, None).await.unwrap();

        handle(&deps, SouthboundEvent::PortAdd { dpid: "sw1".into(), port: PortDesc { name: "sw1-eth1".into(), num: 1 } }).await;
        assert!(deps.topology.get_interface("sw1", "sw1-eth1").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn port_add_retries_then_succeeds_once_switch_appears() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);
        let topology = deps.topology.clone();

        let handled = tokio::spawn({
            let deps = deps.clone();
            async move {
                handle(&deps, SouthboundEvent::PortAdd { dpid: "sw1".into(), port: PortDesc { name: "sw1-eth1".into(), num: 1 } }).await;
            }
        });

        // Let the first (failing) attempt run, then create the switch
        // mid-backoff so the next retry succeeds.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        topology.add_node("sw1".into(), true, ModelNodeType::Switch, None, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        handled.await.unwrap();

        assert!(topology.get_interface("sw1", "sw1-eth1").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn port_add_drops_after_exhausting_retries_on_a_switch_that_never_appears() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);

        let handled = tokio::spawn({
            let deps = deps.clone();
            async move {
                handle(&deps, SouthboundEvent::PortAdd { dpid: "ghost".into(), port: PortDesc { name: "eth1".into(), num: 1 } }).await;
            }
        });
        tokio::time::advance(Duration::from_secs(10)).await;
        handled.await.unwrap();

        assert!(deps.topology.get_interfaces("ghost").await.is_empty());
    }

    #[tokio::test]
    async fn link_add_installs_a_down_link_between_known_nodes() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);
        deps.topology.add_node("a".into(), true, ModelNodeType::Switch, None, None).await.unwrap();
        deps.topology.add_node("b".into(), true, ModelNodeType::Switch, None, None).await.unwrap();
        deps.topology.add_interface("a", "a-p1".into(), Some(1), None, None).await;
        deps.topology.add_interface("b", "b-p1".into(), Some(1), None, None).await;

        handle(&deps, SouthboundEvent::LinkAdd { src: "a".into(), dst: "b".into(), src_port: "a-p1".into(), dst_port: "b-p1".into() }).await;

        let link = deps.topology.get_link("a", "b").await.unwrap();
        assert_eq!(link.state, LinkState::Down);
    }

    #[tokio::test]
    async fn host_add_records_attachment_once_interface_is_registered() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);
        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        deps.topology.add_node("h1".into(), true, ModelNodeType::Server, None, None).await.unwrap();
        deps.topology.add_interface("h1", "h1-eth0".into(), None, Some(mac), None).await;

        handle(&deps, SouthboundEvent::HostAdd { mac, dpid: "sw1".into(), port_no: 5 }).await;

        let iface = deps.topology.get_interface("h1", "h1-eth0").await.unwrap();
        assert_eq!(iface.attached_to, Some(("sw1".to_string(), 5)));
    }

    #[tokio::test]
    async fn host_delete_clears_attachment() {
        let adapter = Arc::new(RecordingAdapter::default());
        let deps = deps(adapter);
        let mac: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        deps.topology.add_node("h1".into(), true, ModelNodeType::Server, None, None).await.unwrap();
        deps.topology.add_interface("h1", "h1-eth0".into(), None, Some(mac), None).await;
        handle(&deps, SouthboundEvent::HostAdd { mac, dpid: "sw1".into(), port_no: 5 }).await;

        handle(&deps, SouthboundEvent::HostDelete { mac }).await;

        let iface = deps.topology.get_interface("h1", "h1-eth0").await.unwrap();
        assert_eq!(iface.attached_to, None);
    }
}
