//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use edgectl_model::{
    Interface, Link, LinkState, Node, NodeId, NodeSpecsUpdate, NodeState, NodeType,
};
use edgectl_utils::MacAddr;
use tokio::sync::RwLock;

use crate::error::Error;

/// Reference to a port either by name or by OpenFlow port number, as used
/// by `get_link_at_port`/`get_links_at_port`/`get_dst_at_port` in
/// spec.md §4.1.
#[derive(Clone, Copy, Debug)]
pub enum PortRef<'a> {
    Name(&'a str),
    Num(u32),
}

/// Entry kept in the MAC reverse index, spec.md §3's
/// "MAC→{node_id,name,ipv4,dpid,port_name,port_no}".
#[derive(Clone, Debug)]
pub struct MacEntry {
    pub node_id: NodeId,
    pub port_name: String,
    pub port_no: Option<u32>,
    pub ipv4: Option<Ipv4Addr>,
}

/// Entry kept in the IPv4 reverse index.
#[derive(Clone, Debug)]
pub struct IpEntry {
    pub node_id: NodeId,
    pub port_name: String,
    pub port_no: Option<u32>,
    pub mac: Option<MacAddr>,
}

#[derive(Clone, Debug)]
struct NodeEntry {
    node: Node,
    interfaces: HashMap<String, Interface>,
    /// port number -> port name, for this node.
    port_by_num: HashMap<u32, String>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, NodeEntry>,
    /// Directed edges keyed by (src, dst).
    links: HashMap<(NodeId, NodeId), Link>,
    mac_index: HashMap<MacAddr, MacEntry>,
    ip_index: HashMap<Ipv4Addr, IpEntry>,
    /// src node + outgoing port name or number -> dst node.
    src_port_to_dst_by_name: HashMap<(NodeId, String), NodeId>,
    src_port_to_dst_by_num: HashMap<(NodeId, u32), NodeId>,
}

/// The authoritative, single-writer network model: nodes, interfaces,
/// links, and their reverse indices (spec.md §3/§4.1). Cheaply cloneable
/// (an `Arc` around the lock), so every task that needs topology access
/// holds its own handle.
#[derive(Clone)]
pub struct Topology {
    inner: Arc<RwLock<Inner>>,
}

impl Default for Topology {
    fn default() -> Self {
        Topology {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node. Idempotent: calling it again for an existing id is
    /// rejected rather than silently overwriting state a concurrent
    /// reader might be relying on (the REST layer maps this to the 303
    /// conflict response of spec.md §6).
    pub async fn add_node(
        &self,
        id: NodeId,
        state: NodeState,
        kind: NodeType,
        label: Option<String>,
        threshold: Option<f64>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        if inner.nodes.contains_key(&id) {
            return Err(Error::NodeAlreadyExists(id));
        }
        let mut node = Node::new(id.clone(), kind, state);
        node.label = label;
        if let Some(threshold) = threshold {
            node.threshold = threshold;
        }
        inner.nodes.insert(
            id,
            NodeEntry {
                node,
                interfaces: HashMap::new(),
                port_by_num: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Removes a node along with all its interfaces (and their MAC/IP
    /// reverse entries), all incident links in both directions, and the
    /// `srcPort→dst` entries rooted at it. Spec.md §4.1/§8.
    pub async fn delete_node(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.remove(id) else {
            return false;
        };

        for name in entry.interfaces.keys() {
            Self::purge_reverse_indices_for(&mut inner, id, name);
        }
        inner.src_port_to_dst_by_name.retain(|(src, _), _| src != id);
        inner.src_port_to_dst_by_num.retain(|(src, _), _| src != id);

        inner
            .links
            .retain(|(src, dst), _| src != id && dst != id);
        true
    }

    fn purge_reverse_indices_for(inner: &mut Inner, node_id: &str, port_name: &str) {
        inner
            .mac_index
            .retain(|_, entry| !(entry.node_id == node_id && entry.port_name == port_name));
        inner
            .ip_index
            .retain(|_, entry| !(entry.node_id == node_id && entry.port_name == port_name));
    }

    /// Registers an interface on `node_id`. Fails if the node is unknown.
    pub async fn add_interface(
        &self,
        node_id: &str,
        name: String,
        num: Option<u32>,
        mac: Option<MacAddr>,
        ipv4: Option<Ipv4Addr>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.nodes.contains_key(node_id) {
            return false;
        }

        let mut iface = Interface::new(name.clone());
        iface.num = num;
        iface.mac = mac;
        iface.ipv4 = ipv4;

        if let Some(num) = num {
            inner
                .nodes
                .get_mut(node_id)
                .unwrap()
                .port_by_num
                .insert(num, name.clone());
        }
        if let Some(mac) = mac {
            inner.mac_index.insert(
                mac,
                MacEntry {
                    node_id: node_id.to_string(),
                    port_name: name.clone(),
                    port_no: num,
                    ipv4,
                },
            );
        }
        if let Some(ipv4) = ipv4 {
            inner.ip_index.insert(
                ipv4,
                IpEntry {
                    node_id: node_id.to_string(),
                    port_name: name.clone(),
                    port_no: num,
                    mac,
                },
            );
        }

        inner
            .nodes
            .get_mut(node_id)
            .unwrap()
            .interfaces
            .insert(name, iface);
        true
    }

    /// Removes an interface and the links at both directions whose port
    /// has that name.
    pub async fn delete_interface(&self, node_id: &str, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.get_mut(node_id) else {
            return false;
        };
        let Some(iface) = entry.interfaces.remove(name) else {
            return false;
        };
        if let Some(num) = iface.num {
            entry.port_by_num.remove(&num);
        }

        Self::purge_reverse_indices_for(&mut inner, node_id, name);
        inner.src_port_to_dst_by_name.remove(&(node_id.to_string(), name.to_string()));
        if let Some(num) = iface.num {
            inner.src_port_to_dst_by_num.remove(&(node_id.to_string(), num));
        }

        inner.links.retain(|(src, dst), link| {
            !((src == node_id && link.src_port == name)
                || (dst == node_id && link.dst_port == name))
        });
        true
    }

    /// Adds a directed edge `src -> dst`. Fails if either node or either
    /// named port is unknown.
    pub async fn add_link(
        &self,
        src: &str,
        dst: &str,
        src_port_name: &str,
        dst_port_name: &str,
        state: LinkState,
    ) -> bool {
        let mut inner = self.inner.write().await;

        let (src_num, dst_num) = {
            let src_entry = match inner.nodes.get(src) {
                Some(e) if e.interfaces.contains_key(src_port_name) => e,
                _ => return false,
            };
            let dst_entry = match inner.nodes.get(dst) {
                Some(e) if e.interfaces.contains_key(dst_port_name) => e,
                _ => return false,
            };
            (
                src_entry.interfaces[src_port_name].num,
                dst_entry.interfaces[dst_port_name].num,
            )
        };

        let mut link = Link::new(src_port_name.to_string(), dst_port_name.to_string(), state);
        // Invariant (iv): capacity/bandwidth derive from the endpoint ports.
        let src_caps = inner.nodes[src].interfaces[src_port_name].specs;
        let dst_caps = inner.nodes[dst].interfaces[dst_port_name].specs;
        link.specs.capacity = src_caps.capacity.min(dst_caps.capacity);
        link.specs.bandwidth = src_caps.bw_up.min(dst_caps.bw_down);

        inner
            .src_port_to_dst_by_name
            .insert((src.to_string(), src_port_name.to_string()), dst.to_string());
        if let Some(num) = src_num {
            inner
                .src_port_to_dst_by_num
                .insert((src.to_string(), num), dst.to_string());
        }
        let _ = dst_num;

        inner.links.insert((src.to_string(), dst.to_string()), link);
        true
    }

    pub async fn delete_link(&self, src: &str, dst: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.links.remove(&(src.to_string(), dst.to_string())).is_some()
    }

    pub async fn get_link(&self, src: &str, dst: &str) -> Option<Link> {
        let inner = self.inner.read().await;
        inner.links.get(&(src.to_string(), dst.to_string())).cloned()
    }

    /// The link that leaves `src` at `port`, if any (single direction).
    pub async fn get_link_at_port(&self, src: &str, port: PortRef<'_>) -> Option<((NodeId, NodeId), Link)> {
        let inner = self.inner.read().await;
        let port_name = Self::resolve_port_name(&inner, src, port)?;
        inner
            .links
            .iter()
            .find(|((s, _), link)| s == src && link.src_port == port_name)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Both the outgoing and incoming link at `port`, spec.md §4.1.
    pub async fn get_links_at_port(
        &self,
        src: &str,
        port: PortRef<'_>,
    ) -> Vec<((NodeId, NodeId), Link)> {
        let inner = self.inner.read().await;
        let Some(port_name) = Self::resolve_port_name(&inner, src, port) else {
            return Vec::new();
        };
        inner
            .links
            .iter()
            .filter(|((s, d), link)| {
                (s == src && link.src_port == port_name) || (d == src && link.dst_port == port_name)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn get_dst_at_port(&self, src: &str, port: PortRef<'_>) -> Option<NodeId> {
        let inner = self.inner.read().await;
        match port {
            PortRef::Name(name) => inner
                .src_port_to_dst_by_name
                .get(&(src.to_string(), name.to_string()))
                .cloned(),
            PortRef::Num(num) => inner
                .src_port_to_dst_by_num
                .get(&(src.to_string(), num))
                .cloned(),
        }
    }

    fn resolve_port_name(inner: &Inner, src: &str, port: PortRef<'_>) -> Option<String> {
        match port {
            PortRef::Name(name) => Some(name.to_string()),
            PortRef::Num(num) => inner.nodes.get(src)?.port_by_num.get(&num).cloned(),
        }
    }

    pub async fn get_by_mac(&self, mac: MacAddr) -> Option<MacEntry> {
        self.inner.read().await.mac_index.get(&mac).cloned()
    }

    pub async fn get_by_ip(&self, ipv4: Ipv4Addr) -> Option<IpEntry> {
        self.inner.read().await.ip_index.get(&ipv4).cloned()
    }

    pub async fn set_main_interface(&self, node_id: &str, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.get_mut(node_id) else {
            return false;
        };
        if !entry.interfaces.contains_key(name) {
            return false;
        }
        entry.node.main_interface = Some(name.to_string());
        true
    }

    /// Records that a host interface is physically attached to
    /// `(switch_id, switch_port_no)`, as reported by a south-bound
    /// host-add/host-move event. Consumed by the host-link stitcher.
    pub async fn set_interface_attachment(
        &self,
        node_id: &str,
        name: &str,
        switch_id: NodeId,
        switch_port_no: u32,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.get_mut(node_id) else {
            return false;
        };
        let Some(iface) = entry.interfaces.get_mut(name) else {
            return false;
        };
        iface.attached_to = Some((switch_id, switch_port_no));
        true
    }

    /// Clears a previously recorded attachment, as reported by a
    /// south-bound host-delete event. The interface itself is left in
    /// place (only its physical attachment point is forgotten); any link
    /// the stitcher already synthesized for it is untouched, mirroring
    /// `original_source/server/ryu_apps/topology.py`'s `_host_delete_handler`,
    /// which only forgets the host's port mapping.
    pub async fn clear_interface_attachment(&self, node_id: &str, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.get_mut(node_id) else {
            return false;
        };
        let Some(iface) = entry.interfaces.get_mut(name) else {
            return false;
        };
        iface.attached_to = None;
        true
    }

    /// All (host node id, host interface, attachment) triples known to
    /// the graph, used by the stitcher to find candidate host↔switch
    /// pairs without re-deriving attachment from the MAC index.
    pub(crate) async fn host_attachments(&self) -> Vec<(NodeId, Interface, NodeId, u32)> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for (id, entry) in inner.nodes.iter() {
            if entry.node.kind.is_switch() {
                continue;
            }
            for iface in entry.interfaces.values() {
                if let Some((switch_id, port_no)) = &iface.attached_to {
                    out.push((id.clone(), iface.clone(), switch_id.clone(), *port_no));
                }
            }
        }
        out
    }

    /// Snapshot of all known nodes.
    pub async fn get_nodes(&self) -> Vec<Node> {
        self.inner
            .read()
            .await
            .nodes
            .values()
            .map(|e| e.node.clone())
            .collect()
    }

    /// Snapshot of a single node.
    pub async fn get_node(&self, id: &str) -> Option<Node> {
        self.inner.read().await.nodes.get(id).map(|e| e.node.clone())
    }

    /// Snapshot of a node's interfaces.
    pub async fn get_interfaces(&self, node_id: &str) -> Vec<Interface> {
        self.inner
            .read()
            .await
            .nodes
            .get(node_id)
            .map(|e| e.interfaces.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_interface(&self, node_id: &str, name: &str) -> Option<Interface> {
        self.inner
            .read()
            .await
            .nodes
            .get(node_id)?
            .interfaces
            .get(name)
            .cloned()
    }

    /// Snapshot of all known links, keyed by (src, dst).
    pub async fn get_links(&self) -> Vec<((NodeId, NodeId), Link)> {
        self.inner
            .read()
            .await
            .links
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Direct-neighbor targets reachable from `id` (outgoing edges only),
    /// used by the selection engine's Dijkstra/simple-path walks.
    pub async fn neighbors(&self, id: &str) -> Vec<(NodeId, Link)> {
        self.inner
            .read()
            .await
            .links
            .iter()
            .filter(|((s, _), _)| s == id)
            .map(|((_, d), link)| (d.clone(), link.clone()))
            .collect()
    }

    pub async fn contains_node(&self, id: &str) -> bool {
        self.inner.read().await.nodes.contains_key(id)
    }

    // ===== mutation entry points used by edgectl-monitor =====

    pub async fn update_node_specs(
        &self,
        id: &str,
        update: NodeSpecsUpdate,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.get_mut(id) else {
            return false;
        };
        entry.node.specs.apply(update, ts);
        true
    }

    pub async fn interface_specs(&self, node_id: &str, name: &str) -> Option<edgectl_model::InterfaceSpecs> {
        self.inner
            .read()
            .await
            .nodes
            .get(node_id)?
            .interfaces
            .get(name)
            .map(|i| i.specs)
    }

    pub async fn apply_interface_specs(
        &self,
        node_id: &str,
        name: &str,
        update: &edgectl_model::InterfaceSpecsUpdate,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.nodes.get_mut(node_id) else {
            return false;
        };
        let Some(iface) = entry.interfaces.get_mut(name) else {
            return false;
        };
        iface.specs.apply(update, ts)
    }

    pub async fn apply_link_specs(
        &self,
        src: &str,
        dst: &str,
        update: &edgectl_model::LinkSpecsUpdate,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(link) = inner.links.get_mut(&(src.to_string(), dst.to_string())) else {
            return false;
        };
        link.specs.apply(update, ts)
    }

    pub async fn set_link_state(&self, src: &str, dst: &str, state: LinkState) -> bool {
        let mut inner = self.inner.write().await;
        let Some(link) = inner.links.get_mut(&(src.to_string(), dst.to_string())) else {
            return false;
        };
        link.state = state;
        true
    }

    /// Recomputes `capacity`/`bandwidth` for every link whose endpoint is
    /// (`node_id`, `port_name`), from the current interface readings.
    /// Called after an interface spec update so invariant (iv) never
    /// drifts from the ports it derives from.
    pub async fn recompute_link_capacities(&self, node_id: &str, port_name: &str) {
        let mut inner = self.inner.write().await;
        let keys: Vec<(NodeId, NodeId)> = inner
            .links
            .iter()
            .filter(|((s, d), link)| {
                (s == node_id && link.src_port == port_name)
                    || (d == node_id && link.dst_port == port_name)
            })
            .map(|(k, _)| k.clone())
            .collect();

        for (src, dst) in keys {
            let src_specs = inner
                .nodes
                .get(&src)
                .and_then(|e| {
                    let port = inner.links.get(&(src.clone(), dst.clone())).unwrap().src_port.clone();
                    e.interfaces.get(&port).map(|i| i.specs)
                })
                .unwrap_or_default();
            let dst_specs = inner
                .nodes
                .get(&dst)
                .and_then(|e| {
                    let port = inner.links.get(&(src.clone(), dst.clone())).unwrap().dst_port.clone();
                    e.interfaces.get(&port).map(|i| i.specs)
                })
                .unwrap_or_default();

            if let Some(link) = inner.links.get_mut(&(src, dst)) {
                link.specs.capacity = src_specs.capacity.min(dst_specs.capacity);
                link.specs.bandwidth = src_specs.bw_up.min(dst_specs.bw_down);
            }
        }
    }

    /// Known (node_id, dpid)-complete MAC entries used by the stitcher to
    /// decide which host↔switch pairs need a synthesized link.
    pub(crate) async fn mac_entries_snapshot(&self) -> Vec<(MacAddr, MacEntry)> {
        self.inner
            .read()
            .await
            .mac_index
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }
}
