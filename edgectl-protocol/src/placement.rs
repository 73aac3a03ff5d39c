//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The placement coroutine, spec.md §4.4: for one Request attempt,
//! select candidate hosts (and, if orchestrator-paths are enabled,
//! candidate paths to them), enumerate them in rank order sending RREQ
//! and awaiting a reply, and on success debit the host, commit the
//! flow, and answer the source with HRES. Grounded in
//! `original_source/server/ryu_apps/protocol.py`'s `_select_host`.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use edgectl_model::{CosSpecs, NodeId, NodeRef, NodeSpecsUpdate, Path as PathRecord, Request, RequestState};
use edgectl_selection::{NodeSelector, PathCandidate, PathSelector, PathWeight, Strategy};
use edgectl_topology::Topology;
use edgectl_utils::MacAddr;
use tracing::{info, warn};

use crate::flow;
use crate::frame::{Frame, FrameState};
use crate::l2::ManagedPairs;
use crate::requests::RequestStore;
use crate::rendezvous::Rendezvous;
use crate::southbound::SouthboundAdapter;

/// The orchestrator-wide tunables the placement coroutine needs,
/// spec.md §6's `ORCHESTRATOR_*`/`PROTOCOL_*` configuration.
#[derive(Clone, Copy, Debug)]
pub struct PlacementConfig {
    pub orchestrator_paths: bool,
    pub path_weight: PathWeight,
    pub proto_timeout: Duration,
    pub proto_retries: u32,
}

/// The collaborators the coroutine needs; bundled so `run`'s signature
/// doesn't grow every time another dependency joins.
#[derive(Clone)]
pub struct PlacementDeps {
    pub topology: Topology,
    pub node_selector: NodeSelector,
    pub path_selector: PathSelector,
    pub requests: RequestStore,
    pub rendezvous: Rendezvous,
    pub southbound: Arc<dyn SouthboundAdapter>,
    pub managed_pairs: ManagedPairs,
}

struct Candidate {
    host: NodeId,
    mac: MacAddr,
    ip: Ipv4Addr,
    dpid: NodeId,
    out_port: u32,
    path: Option<PathRecord>,
}

/// Runs the full placement coroutine for `(src_ip, req_id)`'s current
/// attempt. Spawned by the frame dispatcher on HREQ; `src_mac`/`src_ip`
/// are the requesting host's own link-layer address, captured from the
/// packet that carried the HREQ (the HREQ frame body itself carries
/// neither, spec.md §4.4/§6).
pub async fn run(deps: PlacementDeps, config: PlacementConfig, src_ip: Ipv4Addr, src_mac: MacAddr, req_id: String) {
    let Some(req) = deps.requests.get(src_ip, &req_id).await else {
        warn!(%req_id, "placement coroutine started for an unknown request");
        return;
    };

    let nodes = deps.topology.get_nodes().await;
    let hosts = deps.node_selector.select(&nodes, &req, Strategy::All);
    if hosts.is_empty() {
        deps.requests.with_mut(src_ip, &req_id, |r| r.state = RequestState::Hreq).await;
        warn!(%req_id, "placement found no candidate hosts");
        return;
    }

    let candidates = if config.orchestrator_paths {
        build_path_candidates(&deps.topology, &deps.path_selector, &hosts, &req, config.path_weight).await
    } else {
        build_direct_candidates(&deps.topology, &hosts).await
    };

    let attempt_no = req.current_attempt().map(|a| a.attempt_no).unwrap_or(0);
    let Some(cos) = req.cos.clone() else {
        warn!(%req_id, "placement found candidates but the request has no CoS");
        return;
    };

    for candidate in &candidates {
        if deps.requests.state(src_ip, &req_id).await != Some(RequestState::Rreq) {
            return;
        }

        let mut attempts = 0;
        loop {
            if deps.requests.state(src_ip, &req_id).await != Some(RequestState::Rreq) {
                return;
            }

            let mut rreq = Frame::new(FrameState::Rreq, req_id.clone(), attempt_no);
            rreq.src_mac = Some(src_mac);
            rreq.src_ip = Some(src_ip);
            deps.southbound
                .packet_out(&candidate.dpid, candidate.out_port, rreq.encode().freeze())
                .await;

            let reply = deps.rendezvous.wait(src_ip, &req_id, candidate.mac, config.proto_timeout).await;
            attempts += 1;

            match reply.map(|f| f.state) {
                Some(FrameState::Rres) => {
                    let chosen = on_rres(&deps, config, &req_id, src_ip, src_mac, candidate, &cos.specs).await;
                    if chosen {
                        return;
                    }
                    break;
                }
                // RCAN, or any other reply: this candidate is done either way.
                Some(_) => break,
                None if attempts >= config.proto_retries => break,
                None => continue,
            }
        }
    }

    if deps.requests.state(src_ip, &req_id).await == Some(RequestState::Rreq) {
        deps.requests.with_mut(src_ip, &req_id, |r| r.state = RequestState::Hreq).await;
        info!(%req_id, "placement exhausted every candidate");
    }
}

async fn on_rres(
    deps: &PlacementDeps,
    config: PlacementConfig,
    req_id: &str,
    src_ip: Ipv4Addr,
    src_mac: MacAddr,
    candidate: &Candidate,
    cos: &CosSpecs,
) -> bool {
    let already_chosen = deps
        .requests
        .with_mut(src_ip, req_id, |r| r.host.is_some())
        .await
        .unwrap_or(true);
    if already_chosen {
        return false;
    }

    let now = Utc::now();
    let claimed = deps
        .requests
        .with_mut(src_ip, req_id, |r| {
            r.host = Some(candidate.host.clone());
            r.state = RequestState::Hres;
            r.path = candidate.path.clone();
            if let Some(attempt) = r.current_attempt_mut() {
                attempt.rres_at = Some(now);
                attempt.hres_at = Some(now);
                attempt.host = Some(candidate.host.clone());
                attempt.path = candidate.path.clone();
                attempt.state = RequestState::Hres;
            }
        })
        .await
        .is_some();
    if !claimed {
        return false;
    }

    if let Some(node) = deps.topology.get_node(&candidate.host).await {
        let update = NodeSpecsUpdate {
            cpu_free: Some(node.specs.cpu_free - cos.min_cpu),
            mem_free: Some(node.specs.mem_free - cos.min_ram),
            disk_free: Some(node.specs.disk_free - cos.min_disk),
            ..Default::default()
        };
        deps.topology.update_node_specs(&candidate.host, update, now).await;
    }

    deps.managed_pairs.mark(src_mac, candidate.mac);

    deps.southbound
        .packet_out(&candidate.dpid, candidate.out_port, Frame::new(FrameState::Rack, req_id, 0).encode().freeze())
        .await;

    if let Some(entry) = deps.topology.get_by_ip(src_ip).await {
        if let Some(out_port) = entry.port_no {
            let mut hres = Frame::new(FrameState::Hres, req_id, 0);
            hres.host_mac = Some(candidate.mac);
            hres.host_ip = Some(candidate.ip);
            deps.southbound.packet_out(&entry.node_id, out_port, hres.encode().freeze()).await;
        } else {
            warn!(%src_ip, "cannot send HRES: source's attachment port has no OpenFlow number");
        }
    } else {
        warn!(%src_ip, "cannot send HRES: source is not attached to any known switch");
    }

    if config.orchestrator_paths {
        if let Some(path) = &candidate.path {
            flow::commit_path(&deps.topology, deps.southbound.as_ref(), &path.nodes, src_ip, candidate.ip).await;
        }
    }

    true
}

async fn build_direct_candidates(topology: &Topology, hosts: &[NodeId]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for host in hosts {
        if let Some(candidate) = resolve_candidate(topology, host, None).await {
            out.push(candidate);
        }
    }
    out
}

async fn build_path_candidates(
    topology: &Topology,
    path_selector: &PathSelector,
    hosts: &[NodeId],
    req: &Request,
    weight: PathWeight,
) -> Vec<Candidate> {
    let path_candidates = path_selector.select(topology, hosts, req, weight, Strategy::All).await;
    let mut out = Vec::new();
    for pc in &path_candidates {
        let record = build_path_record(topology, req, pc).await;
        if let Some(candidate) = resolve_candidate(topology, &pc.target, Some(record)).await {
            out.push(candidate);
        }
    }
    out
}

/// Resolves a candidate host's address and the switch port its RREQ
/// must be sent out of, via its main interface's `attached_to` (the
/// switch/port a south-bound host-add event reported it behind).
async fn resolve_candidate(topology: &Topology, host: &str, path: Option<PathRecord>) -> Option<Candidate> {
    let node = topology.get_node(host).await?;
    let name = node.main_interface?;
    let iface = topology.get_interface(host, &name).await?;
    let mac = iface.mac?;
    let ip = iface.ipv4?;
    let (dpid, out_port) = iface.attached_to?;
    Some(Candidate { host: host.to_string(), mac, ip, dpid, out_port, path })
}

async fn build_path_record(topology: &Topology, req: &Request, pc: &PathCandidate) -> PathRecord {
    let attempt_no = req.current_attempt().map(|a| a.attempt_no).unwrap_or(0);
    let src_ip = match &req.src {
        NodeRef::Unknown(ip) => *ip,
        NodeRef::Known(_) => req.current_attempt().map(|a| a.src_ip).unwrap_or(Ipv4Addr::UNSPECIFIED),
    };

    let mut hop_bandwidth = Vec::new();
    let mut hop_delay = Vec::new();
    let mut hop_jitter = Vec::new();
    let mut hop_loss_rate = Vec::new();
    for pair in pc.path.windows(2) {
        if let Some(link) = topology.get_link(&pair[0], &pair[1]).await {
            hop_bandwidth.push(link.specs.bandwidth);
            hop_delay.push(link.specs.delay);
            hop_jitter.push(link.specs.jitter);
            hop_loss_rate.push(link.specs.loss_rate);
        }
    }

    PathRecord {
        req_id: req.id.clone(),
        src_ip,
        attempt_no,
        host: pc.target.clone(),
        nodes: pc.path.clone(),
        algorithm: pc.algorithm.to_string(),
        weight_type: pc.weight_type.to_string(),
        weight: pc.weight,
        hop_bandwidth,
        hop_delay,
        hop_jitter,
        hop_loss_rate,
        ts: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use edgectl_model::{Cos, CosSpecs as Specs, NodeRef, NodeType};

    use super::*;
    use crate::southbound::FlowMod;

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

    async fn topology_with_one_host() -> Topology {
        let topology = Topology::new();
        topology.add_node("sw1".into(), true, NodeType::Switch, None, None).await.unwrap();
        topology.add_node("h1".into(), true, NodeType::Server, None, None).await.unwrap();
        topology.add_interface("sw1", "sw1-eth1".into(), Some(1), None, None).await;
        topology
            .add_interface(
                "h1",
                "h1-eth0".into(),
                None,
                Some(MacAddr::from([0, 0, 0, 0, 0, 9])),
                Some(Ipv4Addr::new(10, 0, 0, 9)),
            )
            .await;
        topology.set_main_interface("h1", "h1-eth0").await;
        topology.set_interface_attachment("h1", "h1-eth0", "sw1", 1).await;
        topology
    }

    #[tokio::test]
    async fn sends_rreq_then_commits_on_rres() {
        let topology = topology_with_one_host().await;
        let requests = RequestStore::new();
        let src_ip = Ipv4Addr::new(10, 0, 0, 1);
        requests
            .begin_attempt(src_ip, "req-1", NodeRef::Unknown(src_ip), Some(Cos { id: 1, name: "any".into(), specs: Specs::default() }), Utc::now())
            .await
            .unwrap();

        let rendezvous = Rendezvous::new();
        let adapter: Arc<dyn SouthboundAdapter> = Arc::new(RecordingAdapter::default());
        let deps = PlacementDeps {
            topology: topology.clone(),
            node_selector: NodeSelector::default(),
            path_selector: PathSelector::default(),
            requests: requests.clone(),
            rendezvous: rendezvous.clone(),
            southbound: adapter.clone(),
            managed_pairs: ManagedPairs::new(),
        };
        let config = PlacementConfig {
            orchestrator_paths: false,
            path_weight: PathWeight::Hop,
            proto_timeout: Duration::from_millis(200),
            proto_retries: 2,
        };

        let src_mac = MacAddr::from([0, 0, 0, 0, 0, 1]);
        let handle = tokio::spawn(run(deps, config, src_ip, src_mac, "req-1".to_string()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let host_mac = MacAddr::from([0, 0, 0, 0, 0, 9]);
        let mut rres = Frame::new(FrameState::Rres, "req-1", 0);
        rres.src_mac = Some(src_mac);
        rres.src_ip = Some(src_ip);
        assert!(rendezvous.deliver(src_ip, "req-1", host_mac, rres).await);

        handle.await.unwrap();

        let final_req = requests.get(src_ip, "req-1").await.unwrap();
        assert_eq!(final_req.state, RequestState::Hres);
        assert_eq!(final_req.host.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn no_candidates_reverts_request_to_hreq() {
        let topology = Topology::new();
        topology.add_node("sw1".into(), true, NodeType::Switch, None, None).await.unwrap();
        let requests = RequestStore::new();
        let src_ip = Ipv4Addr::new(10, 0, 0, 5);
        requests
            .begin_attempt(src_ip, "req-2", NodeRef::Unknown(src_ip), Some(Cos { id: 1, name: "any".into(), specs: Specs::default() }), Utc::now())
            .await
            .unwrap();

        let deps = PlacementDeps {
            topology,
            node_selector: NodeSelector::default(),
            path_selector: PathSelector::default(),
            requests: requests.clone(),
            rendezvous: Rendezvous::new(),
            southbound: Arc::new(RecordingAdapter::default()),
            managed_pairs: ManagedPairs::new(),
        };
        let config = PlacementConfig {
            orchestrator_paths: false,
            path_weight: PathWeight::Hop,
            proto_timeout: Duration::from_millis(50),
            proto_retries: 1,
        };
        run(deps, config, src_ip, MacAddr::from([1, 1, 1, 1, 1, 1]), "req-2".to_string()).await;

        let final_req = requests.get(src_ip, "req-2").await.unwrap();
        assert_eq!(final_req.state, RequestState::Hreq);
    }

    /// Two hosts hung off distinct ports of the same switch, each with
    /// 4 free CPU cores so a debit is observable: `(topology, h1_mac,
    /// h2_mac, port_to_host)`, the last mapping the OpenFlow out-port a
    /// candidate's RREQ is sent on back to which host it targets (the
    /// recorded frame itself carries no host-identifying field — only
    /// `src_mac`/`src_ip`, spec.md §4.6 — so tests must disambiguate by
    /// port instead).
    async fn topology_with_two_hosts() -> (Topology, MacAddr, MacAddr, [(u32, &'static str); 2]) {
        let topology = Topology::new();
        topology.add_node("sw1".into(), true, NodeType::Switch, None, None).await.unwrap();
        topology.add_node("h1".into(), true, NodeType::Server, None, Some(0.5)).await.unwrap();
        topology.add_node("h2".into(), true, NodeType::Server, None, Some(0.5)).await.unwrap();
        topology.add_interface("sw1", "sw1-eth1".into(), Some(1), None, None).await;
        topology.add_interface("sw1", "sw1-eth2".into(), Some(2), None, None).await;

        let h1_mac = MacAddr::from([0, 0, 0, 0, 0, 10]);
        let h2_mac = MacAddr::from([0, 0, 0, 0, 0, 20]);
        topology.add_interface("h1", "h1-eth0".into(), None, Some(h1_mac), Some(Ipv4Addr::new(10, 0, 0, 10))).await;
        topology.add_interface("h2", "h2-eth0".into(), None, Some(h2_mac), Some(Ipv4Addr::new(10, 0, 0, 20))).await;
        topology.set_main_interface("h1", "h1-eth0").await;
        topology.set_main_interface("h2", "h2-eth0").await;
        topology.set_interface_attachment("h1", "h1-eth0", "sw1", 1).await;
        topology.set_interface_attachment("h2", "h2-eth0", "sw1", 2).await;

        let specs = NodeSpecsUpdate {
            cpu_count: Some(4.0),
            cpu_free: Some(4.0),
            mem_total: Some(8.0),
            mem_free: Some(8.0),
            disk_total: Some(100.0),
            disk_free: Some(100.0),
        };
        topology.update_node_specs("h1", specs, Utc::now()).await;
        topology.update_node_specs("h2", specs, Utc::now()).await;

        (topology, h1_mac, h2_mac, [(1, "h1"), (2, "h2")])
    }

    /// Spec.md §8 scenario 3: the first candidate to reply cancels, so
    /// the controller keeps iterating and the second candidate is the
    /// one that ends up chosen — and is the only one debited.
    #[tokio::test]
    async fn rcan_from_first_candidate_advances_to_the_second() {
        let (topology, h1_mac, h2_mac, port_to_host) = topology_with_two_hosts().await;
        let requests = RequestStore::new();
        let src_ip = Ipv4Addr::new(10, 0, 0, 1);
        let cos = Cos {
            id: 1,
            name: "any".into(),
            specs: Specs { min_cpu: 1.0, min_ram: 1.0, min_disk: 1.0, ..Specs::default() },
        };
        requests
            .begin_attempt(src_ip, "req-3", NodeRef::Unknown(src_ip), Some(cos), Utc::now())
            .await
            .unwrap();

        let rendezvous = Rendezvous::new();
        let adapter = Arc::new(RecordingAdapter::default());
        let southbound: Arc<dyn SouthboundAdapter> = adapter.clone();
        let deps = PlacementDeps {
            topology: topology.clone(),
            node_selector: NodeSelector::default(),
            path_selector: PathSelector::default(),
            requests: requests.clone(),
            rendezvous: rendezvous.clone(),
            southbound,
            managed_pairs: ManagedPairs::new(),
        };
        let config = PlacementConfig {
            orchestrator_paths: false,
            path_weight: PathWeight::Hop,
            proto_timeout: Duration::from_millis(300),
            proto_retries: 1,
        };

        let src_mac = MacAddr::from([0, 0, 0, 0, 0, 1]);
        let handle = tokio::spawn(run(deps, config, src_ip, src_mac, "req-3".to_string()));

        // Answer whichever candidate gets tried first with RCAN, then
        // answer the other with RRES.
        let first_host = wait_for_nth_rreq_host(&adapter, &port_to_host, 1).await;
        let (first_mac, second_mac, second_host) = if first_host == "h1" {
            (h1_mac, h2_mac, "h2")
        } else {
            (h2_mac, h1_mac, "h1")
        };

        let mut rcan = Frame::new(FrameState::Rcan, "req-3", 0);
        rcan.src_mac = Some(src_mac);
        rcan.src_ip = Some(src_ip);
        assert!(rendezvous.deliver(src_ip, "req-3", first_mac, rcan).await);

        wait_for_nth_rreq_host(&adapter, &port_to_host, 2).await;
        let mut rres = Frame::new(FrameState::Rres, "req-3", 0);
        rres.src_mac = Some(src_mac);
        rres.src_ip = Some(src_ip);
        assert!(rendezvous.deliver(src_ip, "req-3", second_mac, rres).await);

        handle.await.unwrap();

        let final_req = requests.get(src_ip, "req-3").await.unwrap();
        assert_eq!(final_req.state, RequestState::Hres);
        assert_eq!(final_req.host.as_deref(), Some(second_host));

        let chosen_node = topology.get_node(second_host).await.unwrap();
        assert_eq!(chosen_node.specs.cpu_free, 3.0, "the chosen host should be debited");
        let cancelled_node = topology.get_node(first_host).await.unwrap();
        assert_eq!(cancelled_node.specs.cpu_free, 4.0, "the cancelled host must never be debited");
    }

    /// Spec.md §8 scenario 4: the chosen candidate times out once and is
    /// retried, succeeding on the second attempt rather than being
    /// skipped (retries are bounded by `PROTO_RETRIES`, not abandoned on
    /// the first miss).
    #[tokio::test]
    async fn chosen_host_times_out_once_then_succeeds_on_retry() {
        let topology = topology_with_one_host().await;
        let requests = RequestStore::new();
        let src_ip = Ipv4Addr::new(10, 0, 0, 1);
        requests
            .begin_attempt(src_ip, "req-4", NodeRef::Unknown(src_ip), Some(Cos { id: 1, name: "any".into(), specs: Specs::default() }), Utc::now())
            .await
            .unwrap();

        let rendezvous = Rendezvous::new();
        let adapter = Arc::new(RecordingAdapter::default());
        let southbound: Arc<dyn SouthboundAdapter> = adapter.clone();
        let deps = PlacementDeps {
            topology,
            node_selector: NodeSelector::default(),
            path_selector: PathSelector::default(),
            requests: requests.clone(),
            rendezvous: rendezvous.clone(),
            southbound,
            managed_pairs: ManagedPairs::new(),
        };
        let config = PlacementConfig {
            orchestrator_paths: false,
            path_weight: PathWeight::Hop,
            proto_timeout: Duration::from_millis(80),
            proto_retries: 2,
        };

        let src_mac = MacAddr::from([0, 0, 0, 0, 0, 1]);
        let host_mac = MacAddr::from([0, 0, 0, 0, 0, 9]);
        let handle = tokio::spawn(run(deps, config, src_ip, src_mac, "req-4".to_string()));

        // Let the first RREQ's wait time out entirely (don't answer it),
        // then answer the retry.
        wait_for_rreq_count(&adapter, 2).await;
        let mut rres = Frame::new(FrameState::Rres, "req-4", 0);
        rres.src_mac = Some(src_mac);
        rres.src_ip = Some(src_ip);
        assert!(rendezvous.deliver(src_ip, "req-4", host_mac, rres).await);

        handle.await.unwrap();

        let final_req = requests.get(src_ip, "req-4").await.unwrap();
        assert_eq!(final_req.state, RequestState::Hres);
        assert_eq!(final_req.host.as_deref(), Some("h1"));
    }

    /// Waits until the `nth` (1-based) RREQ has gone out, then returns
    /// which host its out-port maps to.
    async fn wait_for_nth_rreq_host(
        adapter: &RecordingAdapter,
        port_to_host: &[(u32, &'static str)],
        nth: usize,
    ) -> &'static str {
        for _ in 0..200 {
            {
                let sent = adapter.sent.lock().unwrap();
                let rreqs: Vec<_> = sent.iter().filter(|(_, _, f)| f.state == FrameState::Rreq).collect();
                if rreqs.len() >= nth {
                    let (_, out_port, _) = rreqs[nth - 1];
                    return port_to_host.iter().find(|(p, _)| p == out_port).map(|(_, h)| *h).unwrap();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for RREQ #{nth}");
    }

    async fn wait_for_rreq_count(adapter: &RecordingAdapter, count: usize) {
        for _ in 0..200 {
            if adapter.sent.lock().unwrap().iter().filter(|(_, _, f)| f.state == FrameState::Rreq).count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
