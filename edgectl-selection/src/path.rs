//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use edgectl_model::{Link, NodeId, NodeRef, Request};
use edgectl_topology::Topology;
use tracing::warn;

use crate::Strategy;

/// Path selection algorithm. `DIJKSTRA` and `LEASTCOST` are the two
/// built-in algorithms; unknown names fall back to `DIJKSTRA`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum PathAlgorithm {
    #[default]
    Dijkstra,
    LeastCost,
}

impl PathAlgorithm {
    pub fn parse(name: &str) -> PathAlgorithm {
        match name.to_uppercase().as_str() {
            "" | "DIJKSTRA" => PathAlgorithm::Dijkstra,
            "LEASTCOST" => PathAlgorithm::LeastCost,
            other => {
                warn!(algorithm = %other, "unknown path selection algorithm, falling back to DIJKSTRA");
                PathAlgorithm::Dijkstra
            }
        }
    }
}

/// Edge weight used by [`PathAlgorithm::Dijkstra`]. `LEASTCOST` always
/// uses its own composite cost and ignores this.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum PathWeight {
    #[default]
    Hop,
    Delay,
    /// Prefers links with more free bandwidth.
    Bandwidth,
}

impl PathWeight {
    pub fn parse(name: &str) -> PathWeight {
        match name.to_uppercase().as_str() {
            "" | "HOP" => PathWeight::Hop,
            "DELAY" => PathWeight::Delay,
            "BANDWIDTH" => PathWeight::Bandwidth,
            other => {
                warn!(weight = %other, "unknown path weight, falling back to HOP");
                PathWeight::Hop
            }
        }
    }
}

/// One enumerated path to a target.
#[derive(Clone, Debug)]
pub struct PathCandidate {
    pub target: NodeId,
    pub path: Vec<NodeId>,
    pub algorithm: &'static str,
    pub weight_type: &'static str,
    pub weight: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PathSelector {
    algorithm: PathAlgorithm,
}

impl PathSelector {
    pub fn new(algorithm: PathAlgorithm) -> Self {
        PathSelector { algorithm }
    }

    /// Computes path candidates from `req.src` to each of `targets`.
    pub async fn select(
        &self,
        topology: &Topology,
        targets: &[NodeId],
        req: &Request,
        weight: PathWeight,
        strategy: Strategy,
    ) -> Vec<PathCandidate> {
        let NodeRef::Known(src) = &req.src else {
            warn!(request = %req.id, "cannot select paths: request source is not a known node");
            return Vec::new();
        };

        let mut candidates = match self.algorithm {
            PathAlgorithm::Dijkstra => {
                dijkstra_select(topology, src, targets, req, weight).await
            }
            PathAlgorithm::LeastCost => least_cost_select(topology, src, targets, req).await,
        };

        candidates.sort_by(|a, b| {
            a.weight
                .total_cmp(&b.weight)
                .then_with(|| a.target.cmp(&b.target))
        });

        match strategy {
            Strategy::All => candidates,
            Strategy::First => candidates.into_iter().next().into_iter().collect(),
            Strategy::Best => candidates.into_iter().next().into_iter().collect(),
        }
    }
}

async fn adjacency(topology: &Topology) -> HashMap<NodeId, Vec<(NodeId, Link)>> {
    let mut adj: HashMap<NodeId, Vec<(NodeId, Link)>> = HashMap::new();
    for ((src, dst), link) in topology.get_links().await {
        adj.entry(src).or_default().push((dst, link));
    }
    adj
}

fn edge_weight(link: &Link, weight: PathWeight) -> f64 {
    match weight {
        PathWeight::Hop => 1.0,
        PathWeight::Delay => link.specs.delay,
        PathWeight::Bandwidth => 1.0 / link.specs.bandwidth.max(f64::EPSILON),
    }
}

#[derive(Debug)]
struct HeapEntry {
    dist: f64,
    node: NodeId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest distance first.
        other.dist.total_cmp(&self.dist)
    }
}

/// Single-source Dijkstra from `src`. Under `DELAY` weight, exploration
/// never continues past a node whose accumulated distance already
/// exceeds `req.cos.max_delay`.
async fn dijkstra_select(
    topology: &Topology,
    src: &str,
    targets: &[NodeId],
    req: &Request,
    weight: PathWeight,
) -> Vec<PathCandidate> {
    let adj = adjacency(topology).await;
    let cutoff = match weight {
        PathWeight::Delay => req.cos.as_ref().map(|c| c.specs.max_delay),
        _ => None,
    };

    let mut dist: HashMap<NodeId, f64> = HashMap::new();
    let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(src.to_string(), 0.0);
    heap.push(HeapEntry {
        dist: 0.0,
        node: src.to_string(),
    });

    while let Some(HeapEntry { dist: d, node: u }) = heap.pop() {
        if d > *dist.get(&u).unwrap_or(&f64::INFINITY) {
            continue;
        }
        if let Some(cutoff) = cutoff {
            if d > cutoff {
                continue;
            }
        }
        let Some(edges) = adj.get(&u) else {
            continue;
        };
        for (v, link) in edges {
            let nd = d + edge_weight(link, weight);
            if let Some(cutoff) = cutoff {
                if nd > cutoff {
                    continue;
                }
            }
            if nd < *dist.get(v).unwrap_or(&f64::INFINITY) {
                dist.insert(v.clone(), nd);
                prev.insert(v.clone(), u.clone());
                heap.push(HeapEntry {
                    dist: nd,
                    node: v.clone(),
                });
            }
        }
    }

    let mut out = Vec::new();
    for target in targets {
        let Some(&length) = dist.get(target) else {
            continue;
        };
        let path = reconstruct_path(src, target, &prev);
        out.push(PathCandidate {
            target: target.clone(),
            path,
            algorithm: "DIJKSTRA",
            weight_type: weight_name(weight),
            weight: length,
        });
    }
    out
}

fn weight_name(weight: PathWeight) -> &'static str {
    match weight {
        PathWeight::Hop => "HOP",
        PathWeight::Delay => "DELAY",
        PathWeight::Bandwidth => "BANDWIDTH",
    }
}

fn reconstruct_path(src: &str, target: &str, prev: &HashMap<NodeId, NodeId>) -> Vec<NodeId> {
    let mut path = vec![target.to_string()];
    let mut cur = target.to_string();
    while cur != src {
        match prev.get(&cur) {
            Some(p) => {
                path.push(p.clone());
                cur = p.clone();
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// LEASTCOST: enumerate every simple path from `src` to each target and
/// score it by a composite bandwidth/delay/jitter/loss cost.
async fn least_cost_select(
    topology: &Topology,
    src: &str,
    targets: &[NodeId],
    req: &Request,
) -> Vec<PathCandidate> {
    let adj = adjacency(topology).await;
    let Some(cos) = req.cos.as_ref() else {
        warn!(request = %req.id, "cannot select LEASTCOST paths: request has no CoS");
        return Vec::new();
    };

    let mut out = Vec::new();
    for target in targets {
        let mut visited = HashSet::new();
        visited.insert(src.to_string());
        let mut stack = vec![src.to_string()];
        let mut paths = Vec::new();
        enumerate_simple_paths(&adj, src, target, &mut visited, &mut stack, &mut paths);

        for nodes in paths {
            let edges = path_edges(&adj, &nodes);
            let cost = least_cost(&edges, cos);
            out.push(PathCandidate {
                target: target.clone(),
                path: nodes,
                algorithm: "LEASTCOST",
                weight_type: "COST",
                weight: cost,
            });
        }
    }
    out
}

fn path_edges(adj: &HashMap<NodeId, Vec<(NodeId, Link)>>, nodes: &[NodeId]) -> Vec<Link> {
    let mut edges = Vec::new();
    for pair in nodes.windows(2) {
        if let Some(links) = adj.get(&pair[0]) {
            if let Some((_, link)) = links.iter().find(|(n, _)| n == &pair[1]) {
                edges.push(link.clone());
            }
        }
    }
    edges
}

fn enumerate_simple_paths(
    adj: &HashMap<NodeId, Vec<(NodeId, Link)>>,
    current: &str,
    target: &str,
    visited: &mut HashSet<NodeId>,
    stack: &mut Vec<NodeId>,
    out: &mut Vec<Vec<NodeId>>,
) {
    if current == target {
        out.push(stack.clone());
        return;
    }
    let Some(edges) = adj.get(current) else {
        return;
    };
    for (next, _) in edges {
        if visited.contains(next) {
            continue;
        }
        visited.insert(next.clone());
        stack.push(next.clone());
        enumerate_simple_paths(adj, next, target, visited, stack, out);
        stack.pop();
        visited.remove(next);
    }
}

fn least_cost(edges: &[Link], cos: &edgectl_model::Cos) -> f64 {
    if edges.is_empty() {
        return f64::INFINITY;
    }

    let ct = edges.iter().map(|l| l.specs.capacity).fold(f64::INFINITY, f64::min);
    let bw: f64 = edges.iter().map(|l| l.specs.capacity - l.specs.bandwidth).sum();
    let dp: f64 = edges.iter().map(|l| l.specs.delay).sum();
    let jp: f64 = edges.iter().map(|l| l.specs.jitter).sum();
    let lrp = 1.0 - edges.iter().map(|l| 1.0 - l.specs.loss_rate).product::<f64>();

    let cdp = cos.specs.max_delay / dp;
    let cjp = cos.specs.max_jitter / jp;
    let clrp = if lrp > 0.0 {
        cos.specs.max_loss_rate / lrp
    } else {
        f64::INFINITY
    };

    let bwc = cos.specs.min_bw;
    let denom = ct - (bw + bwc);
    if !denom.is_finite() || denom <= 0.0 {
        return f64::INFINITY;
    }
    let cbwp = bwc / denom;

    let divisor = cdp * cjp * clrp;
    if !divisor.is_finite() || divisor <= 0.0 {
        return f64::INFINITY;
    }
    let cost = cbwp / divisor;
    if cost.is_finite() && cost >= 0.0 {
        cost
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use edgectl_model::{Cos, CosSpecs, LinkState, LinkSpecsUpdate, NodeType};
    use edgectl_topology::Topology;

    use super::*;

    async fn linear_topology() -> Topology {
        // a -- b -- c, two hops, each link annotated with distinct delay.
        let topo = Topology::new();
        for id in ["a", "b", "c"] {
            topo.add_node(id.into(), true, NodeType::Server, None, None)
                .await
                .unwrap();
            topo.add_interface(id, "eth0".into(), Some(1), None, None).await;
        }
        topo.add_link("a", "b", "eth0", "eth0", LinkState::Live).await;
        topo.add_link("b", "a", "eth0", "eth0", LinkState::Live).await;
        topo.add_link("b", "c", "eth0", "eth0", LinkState::Live).await;
        topo.add_link("c", "b", "eth0", "eth0", LinkState::Live).await;

        let ts = chrono::Utc::now();
        topo.apply_link_specs(
            "a",
            "b",
            &LinkSpecsUpdate {
                capacity: Some(100.0),
                bandwidth: Some(80.0),
                delay: Some(5.0),
                jitter: Some(1.0),
                loss_rate: Some(0.01),
            },
            ts,
        )
        .await;
        topo.apply_link_specs(
            "b",
            "c",
            &LinkSpecsUpdate {
                capacity: Some(100.0),
                bandwidth: Some(80.0),
                delay: Some(10.0),
                jitter: Some(2.0),
                loss_rate: Some(0.01),
            },
            ts,
        )
        .await;
        topo
    }

    fn request_with_cos(src: &str) -> Request {
        let mut req = Request::new(
            "req-1".into(),
            NodeRef::Known(src.into()),
            chrono::Utc::now(),
        );
        req.cos = Some(Cos {
            id: 1,
            name: "test".into(),
            specs: CosSpecs {
                max_delay: 100.0,
                max_jitter: 100.0,
                max_loss_rate: 1.0,
                min_bw: 1.0,
                ..Default::default()
            },
        });
        req
    }

    #[tokio::test]
    async fn dijkstra_hop_finds_shortest_path_to_each_target() {
        let topo = linear_topology().await;
        let req = request_with_cos("a");
        let selector = PathSelector::new(PathAlgorithm::Dijkstra);

        let result = selector
            .select(&topo, &["b".into(), "c".into()], &req, PathWeight::Hop, Strategy::All)
            .await;

        assert_eq!(result.len(), 2);
        let to_c = result.iter().find(|c| c.target == "c").unwrap();
        assert_eq!(to_c.path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(to_c.weight, 2.0);
    }

    #[tokio::test]
    async fn dijkstra_delay_cutoff_excludes_unreachable_targets() {
        let topo = linear_topology().await;
        let mut req = request_with_cos("a");
        req.cos.as_mut().unwrap().specs.max_delay = 6.0;
        let selector = PathSelector::new(PathAlgorithm::Dijkstra);

        let result = selector
            .select(&topo, &["b".into(), "c".into()], &req, PathWeight::Delay, Strategy::All)
            .await;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].target, "b");
    }

    #[tokio::test]
    async fn least_cost_scores_the_two_hop_path() {
        let topo = linear_topology().await;
        let req = request_with_cos("a");
        let selector = PathSelector::new(PathAlgorithm::LeastCost);

        let result = selector
            .select(&topo, &["c".into()], &req, PathWeight::Hop, Strategy::Best)
            .await;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert!(result[0].weight.is_finite());
    }

    #[tokio::test]
    async fn least_cost_infinite_when_bandwidth_demand_exceeds_capacity() {
        let topo = linear_topology().await;
        let mut req = request_with_cos("a");
        req.cos.as_mut().unwrap().specs.min_bw = 1000.0;
        let selector = PathSelector::new(PathAlgorithm::LeastCost);

        let result = selector
            .select(&topo, &["b".into()], &req, PathWeight::Hop, Strategy::Best)
            .await;

        assert_eq!(result[0].weight, f64::INFINITY);
    }

    #[test]
    fn unknown_algorithm_and_weight_fall_back() {
        assert_eq!(PathAlgorithm::parse("bogus"), PathAlgorithm::Dijkstra);
        assert_eq!(PathWeight::parse("bogus"), PathWeight::Hop);
    }
}
