//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Shared application state handed to every handler, grounded in
//! `RephlexZero-strata`'s `strata-control/src/state.rs::AppState` (an
//! `Arc<Inner>` wrapper cloned into each request). `edgectl-daemon`
//! builds one of these at startup from the pieces it wires together and
//! hands it to [`crate::router`].

use std::sync::Arc;

use edgectl_model::CosRegistry;
use edgectl_monitor::StateUpdater;
use edgectl_protocol::RequestStore;
use edgectl_topology::Topology;
use serde::Serialize;

/// A read-only rendering of the running configuration for `GET /config`,
/// spec.md §6. Owned by `edgectl-northbound` rather than depending on
/// `edgectl-daemon` (the reverse would be a layering cycle); the daemon
/// populates one from its own `Config` at startup.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigView {
    pub decoy_mac: String,
    pub decoy_ip: String,
    pub ofp_port: u16,
    pub verbose: bool,
    pub network_address: String,
    pub stp_enabled: bool,
    pub api_port: u16,
    pub udp_port: u16,
    pub udp_timeout: u64,
    pub orchestrator_paths: bool,
    pub node_algorithm: String,
    pub path_algorithm: String,
    pub path_weight: String,
    pub protocol_send_to: String,
    pub protocol_timeout: u64,
    pub protocol_retries: u32,
    pub monitor_period: u64,
    pub monitor_samples: usize,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    topology: Topology,
    updater: Arc<StateUpdater>,
    requests: RequestStore,
    cos_registry: CosRegistry,
    config: ConfigView,
}

impl AppState {
    pub fn new(
        topology: Topology,
        updater: Arc<StateUpdater>,
        requests: RequestStore,
        cos_registry: CosRegistry,
        config: ConfigView,
    ) -> Self {
        AppState { inner: Arc::new(Inner { topology, updater, requests, cos_registry, config }) }
    }

    pub fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    pub fn updater(&self) -> &Arc<StateUpdater> {
        &self.inner.updater
    }

    pub fn requests(&self) -> &RequestStore {
        &self.inner.requests
    }

    pub fn cos_registry(&self) -> &CosRegistry {
        &self.inner.cos_registry
    }

    pub fn config(&self) -> &ConfigView {
        &self.inner.config
    }
}
