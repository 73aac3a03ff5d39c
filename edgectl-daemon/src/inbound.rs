//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Stand-in south-bound event source, spec.md §2. The real OpenFlow-style
//! datapath runtime is an external collaborator this workspace consumes,
//! not implements: `adapter::LoggingAdapter` plays its *outbound* role
//! (packet-out/install-flow/delete-flow go to tracing instead of a real
//! switch). This module plays the matching *inbound* role: it accepts
//! newline-delimited JSON south-bound notifications on
//! `CONTROLLER_OFP_PORT` and drives `edgectl_protocol::ingress::handle`
//! (protocol packet-ins) and `edgectl_protocol::topology_events::handle`
//! (switch/port/link/host add/delete/modify) with them — the same pair
//! a real adapter would call directly. Without this, both handlers are
//! built but never reachable from the running daemon.

use std::net::Ipv4Addr;

use bytes::Bytes;
use edgectl_protocol::{
    ingress, topology_events, DecoyAddress, IngressDeps, PacketIn, PlacementConfig, PortDesc,
    SouthboundEvent, TopologyEventDeps,
};
use edgectl_utils::task::Task;
use edgectl_utils::MacAddr;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

#[derive(Deserialize)]
struct WirePort {
    name: String,
    num: u32,
}

fn default_active() -> bool {
    true
}

/// One line of the wire protocol: a south-bound packet-in, or one of the
/// topology notifications of spec.md §5.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum InboundMessage {
    PacketIn {
        ingress_dpid: String,
        in_port: u32,
        eth_src: String,
        eth_dst: String,
        ip_src: Ipv4Addr,
        ip_dst: Ipv4Addr,
        payload: Vec<u8>,
    },
    SwitchEnter {
        dpid: String,
        #[serde(default = "default_active")]
        active: bool,
        #[serde(default)]
        ports: Vec<WirePort>,
    },
    SwitchLeave {
        dpid: String,
    },
    PortAdd {
        dpid: String,
        port: WirePort,
    },
    PortDelete {
        dpid: String,
        name: String,
    },
    PortModify {
        dpid: String,
        port: WirePort,
    },
    LinkAdd {
        src: String,
        dst: String,
        src_port: String,
        dst_port: String,
    },
    LinkDelete {
        src: String,
        dst: String,
    },
    HostAdd {
        mac: String,
        dpid: String,
        port_no: u32,
    },
    HostDelete {
        mac: String,
    },
    HostMove {
        mac: String,
        dpid: String,
        port_no: u32,
    },
}

/// Everything one south-bound connection's message loop needs.
#[derive(Clone)]
pub struct InboundDeps {
    pub ingress: IngressDeps,
    pub decoy: DecoyAddress,
    pub placement_config: PlacementConfig,
    pub events: TopologyEventDeps,
}

/// Spawns the listener, restarting it (per `Task::spawn_supervised`) if a
/// connection handler ever panics.
pub fn spawn(bind_port: u16, deps: InboundDeps) -> Task<()> {
    Task::spawn_supervised(move || {
        let deps = deps.clone();
        async move { accept_loop(bind_port, deps).await }
    })
}

async fn accept_loop(bind_port: u16, deps: InboundDeps) {
    let listener = match TcpListener::bind(("0.0.0.0", bind_port)).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, port = bind_port, "failed to bind south-bound event socket");
            std::process::exit(1);
        }
    };
    info!(port = bind_port, "south-bound event listener ready");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(error) => {
                warn!(%error, "failed to accept south-bound connection");
                continue;
            }
        };
        let deps = deps.clone();
        tokio::spawn(async move {
            debug!(%peer, "south-bound adapter connected");
            handle_connection(socket, deps).await;
            debug!(%peer, "south-bound adapter disconnected");
        });
    }
}

async fn handle_connection(socket: TcpStream, deps: InboundDeps) {
    let mut lines = BufReader::new(socket).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    dispatch(&deps, &line).await;
                }
            }
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "south-bound connection read error");
                break;
            }
        }
    }
}

async fn dispatch(deps: &InboundDeps, line: &str) {
    let message: InboundMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(error) => {
            warn!(%error, "dropping malformed south-bound message");
            return;
        }
    };

    if let InboundMessage::PacketIn { ingress_dpid, in_port, eth_src, eth_dst, ip_src, ip_dst, payload } = message {
        let (Ok(eth_src), Ok(eth_dst)) = (eth_src.parse::<MacAddr>(), eth_dst.parse::<MacAddr>()) else {
            warn!("dropping packet-in: malformed mac address");
            return;
        };
        let pkt = PacketIn { ingress_dpid, in_port, eth_src, eth_dst, ip_src, ip_dst, payload: Bytes::from(payload) };
        ingress::handle(deps.ingress.clone(), deps.decoy, deps.placement_config, pkt).await;
        return;
    }

    let Some(event) = to_topology_event(message) else { return };
    topology_events::handle(&deps.events, event).await;
}

/// Converts every non-`PacketIn` message into a [`SouthboundEvent`],
/// dropping (with a warning) any host event whose mac doesn't parse.
fn to_topology_event(message: InboundMessage) -> Option<SouthboundEvent> {
    Some(match message {
        InboundMessage::PacketIn { .. } => return None,
        InboundMessage::SwitchEnter { dpid, active, ports } => SouthboundEvent::SwitchEnter {
            dpid,
            active,
            ports: ports.into_iter().map(|p| PortDesc { name: p.name, num: p.num }).collect(),
        },
        InboundMessage::SwitchLeave { dpid } => SouthboundEvent::SwitchLeave { dpid },
        InboundMessage::PortAdd { dpid, port } => {
            SouthboundEvent::PortAdd { dpid, port: PortDesc { name: port.name, num: port.num } }
        }
        InboundMessage::PortDelete { dpid, name } => SouthboundEvent::PortDelete { dpid, name },
        InboundMessage::PortModify { dpid, port } => {
            SouthboundEvent::PortModify { dpid, port: PortDesc { name: port.name, num: port.num } }
        }
        InboundMessage::LinkAdd { src, dst, src_port, dst_port } => {
            SouthboundEvent::LinkAdd { src, dst, src_port, dst_port }
        }
        InboundMessage::LinkDelete { src, dst } => SouthboundEvent::LinkDelete { src, dst },
        InboundMessage::HostAdd { mac, dpid, port_no } => {
            SouthboundEvent::HostAdd { mac: parse_mac(&mac)?, dpid, port_no }
        }
        InboundMessage::HostDelete { mac } => SouthboundEvent::HostDelete { mac: parse_mac(&mac)? },
        InboundMessage::HostMove { mac, dpid, port_no } => {
            SouthboundEvent::HostMove { mac: parse_mac(&mac)?, dpid, port_no }
        }
    })
}

fn parse_mac(raw: &str) -> Option<MacAddr> {
    match raw.parse() {
        Ok(mac) => Some(mac),
        Err(_) => {
            warn!(mac = %raw, "dropping south-bound event: malformed mac address");
            None
        }
    }
}
