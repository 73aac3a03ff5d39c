//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! `GET /metrics`, spec.md §4.8/§7: a Prometheus text-format rendering of
//! the topology and Request store, polled directly from their existing
//! snapshot-read methods (`Topology::get_nodes`/`get_links`,
//! `RequestStore::all`) rather than through a separate sink abstraction —
//! those reads already satisfy §5's "readers may snapshot" rule. Grounded
//! in `original_source/server/ryu_apps/metrics.py`'s per-entity
//! Gauge/Counter set.

use std::fmt::Write as _;

use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(render))
}

/// Substitutes spec.md §7's documented `-1` sentinel for any reading
/// that isn't finite (delay/jitter default to `+∞` until a monitor tick
/// supplies a real value).
fn sentinel(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        -1.0
    }
}

async fn render(State(state): State<AppState>) -> String {
    let mut out = String::new();

    writeln!(out, "# HELP edgectl_node_up Whether a node is administratively up.").ok();
    writeln!(out, "# TYPE edgectl_node_up gauge").ok();
    writeln!(out, "# HELP edgectl_node_cpu_free Free CPU capacity reported for a node.").ok();
    writeln!(out, "# TYPE edgectl_node_cpu_free gauge").ok();
    writeln!(out, "# HELP edgectl_node_mem_free Free memory reported for a node.").ok();
    writeln!(out, "# TYPE edgectl_node_mem_free gauge").ok();
    writeln!(out, "# HELP edgectl_node_disk_free Free disk reported for a node.").ok();
    writeln!(out, "# TYPE edgectl_node_disk_free gauge").ok();
    for node in state.topology().get_nodes().await {
        let up = if node.state { 1 } else { 0 };
        writeln!(out, "edgectl_node_up{{id=\"{}\"}} {up}", node.id).ok();
        writeln!(out, "edgectl_node_cpu_free{{id=\"{}\"}} {}", node.id, node.specs.cpu_free).ok();
        writeln!(out, "edgectl_node_mem_free{{id=\"{}\"}} {}", node.id, node.specs.mem_free).ok();
        writeln!(out, "edgectl_node_disk_free{{id=\"{}\"}} {}", node.id, node.specs.disk_free).ok();
    }

    writeln!(out, "# HELP edgectl_link_delay_seconds Per-link delay reading (-1 if unmeasured).").ok();
    writeln!(out, "# TYPE edgectl_link_delay_seconds gauge").ok();
    writeln!(out, "# HELP edgectl_link_jitter_seconds Per-link jitter reading (-1 if unmeasured).").ok();
    writeln!(out, "# TYPE edgectl_link_jitter_seconds gauge").ok();
    writeln!(out, "# HELP edgectl_link_loss_rate Per-link loss rate, 0-1.").ok();
    writeln!(out, "# TYPE edgectl_link_loss_rate gauge").ok();
    writeln!(out, "# HELP edgectl_link_bandwidth Per-link free bandwidth.").ok();
    writeln!(out, "# TYPE edgectl_link_bandwidth gauge").ok();
    for ((src, dst), link) in state.topology().get_links().await {
        writeln!(out, "edgectl_link_delay_seconds{{src=\"{src}\",dst=\"{dst}\"}} {}", sentinel(link.specs.delay)).ok();
        writeln!(out, "edgectl_link_jitter_seconds{{src=\"{src}\",dst=\"{dst}\"}} {}", sentinel(link.specs.jitter)).ok();
        writeln!(out, "edgectl_link_loss_rate{{src=\"{src}\",dst=\"{dst}\"}} {}", link.specs.loss_rate).ok();
        writeln!(out, "edgectl_link_bandwidth{{src=\"{src}\",dst=\"{dst}\"}} {}", link.specs.bandwidth).ok();
    }

    writeln!(out, "# HELP edgectl_request_state Current request-level state code, spec.md §6.").ok();
    writeln!(out, "# TYPE edgectl_request_state gauge").ok();
    writeln!(out, "# HELP edgectl_requests_total Total requests known to the store.").ok();
    writeln!(out, "# TYPE edgectl_requests_total counter").ok();
    let requests = state.requests().all().await;
    writeln!(out, "edgectl_requests_total {}", requests.len()).ok();
    for req in requests {
        writeln!(out, "edgectl_request_state{{id=\"{}\"}} {}", req.id, req.state.code()).ok();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_replaces_non_finite_with_minus_one() {
        assert_eq!(sentinel(f64::INFINITY), -1.0);
        assert_eq!(sentinel(3.5), 3.5);
    }
}
