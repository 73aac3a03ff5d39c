//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use edgectl_model::{Node, NodeId, NodeRef, Request};
use tracing::warn;

use crate::Strategy;

/// Node selection algorithm. `SIMPLE` is the only one this spec defines;
/// unknown names fall back to it (spec.md §4.3/§7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum NodeAlgorithm {
    #[default]
    Simple,
}

impl NodeAlgorithm {
    pub fn parse(name: &str) -> NodeAlgorithm {
        match name.to_uppercase().as_str() {
            "" | "SIMPLE" => NodeAlgorithm::Simple,
            other => {
                warn!(algorithm = %other, "unknown node selection algorithm, falling back to SIMPLE");
                NodeAlgorithm::Simple
            }
        }
    }
}

/// Selects candidate hosts for a [`Request`], strategy-driven.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeSelector {
    algorithm: NodeAlgorithm,
}

impl NodeSelector {
    pub fn new(algorithm: NodeAlgorithm) -> Self {
        NodeSelector { algorithm }
    }

    /// Returns the ids of nodes in `nodes` that satisfy `req`, per the
    /// active algorithm and `strategy`.
    pub fn select(&self, nodes: &[Node], req: &Request, strategy: Strategy) -> Vec<NodeId> {
        match self.algorithm {
            NodeAlgorithm::Simple => simple_select(nodes, req, strategy),
        }
    }
}

/// SIMPLE: a node is a candidate iff it isn't the request's own source,
/// it's administratively up, and it has enough free headroom above
/// `threshold * total` to additionally satisfy the request's CoS
/// minimums, spec.md §4.3.
fn simple_select(nodes: &[Node], req: &Request, strategy: Strategy) -> Vec<NodeId> {
    let Some(cos) = req.cos.as_ref() else {
        warn!(request = %req.id, "cannot select nodes: request has no CoS");
        return Vec::new();
    };

    let mut matches = Vec::new();
    for node in nodes {
        if let NodeRef::Known(src_id) = &req.src {
            if src_id == &node.id {
                continue;
            }
        }
        if !node.state {
            continue;
        }

        let specs = &node.specs;
        let cpu_ok = specs.cpu_free - cos.specs.min_cpu >= specs.cpu_count * node.threshold;
        let mem_ok = specs.mem_free - cos.specs.min_ram >= specs.mem_total * node.threshold;
        let disk_ok = specs.disk_free - cos.specs.min_disk >= specs.disk_total * node.threshold;

        if cpu_ok && mem_ok && disk_ok {
            matches.push(node.id.clone());
            if strategy == Strategy::First {
                return matches;
            }
        }
    }

    if strategy == Strategy::Best {
        // SIMPLE has no intrinsic ranking among matches; BEST degrades
        // to the first match, same as the original implementation only
        // ever calling it with ALL or FIRST.
        matches.truncate(1);
    }
    matches
}
