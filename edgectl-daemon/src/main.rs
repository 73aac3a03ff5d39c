//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! `edgectld`: wires the model, topology, monitors, selection engine,
//! and host-request protocol into one running orchestrator, and serves
//! the REST/metrics surface of `edgectl-northbound` alongside it.
//! Grounded in `holo-daemon/src/main.rs`: parse a config file path,
//! initialize tracing, build the long-lived collaborators, hand them to
//! the northbound server, and run until a shutdown signal arrives. No
//! privilege-drop or non-volatile database step survives the transform
//! (this daemon is neither privileged nor persisting anything on disk —
//! noted in DESIGN.md), but the overall shape — parse, init tracing,
//! build, serve, wait for signal — is kept.

mod adapter;
mod config;
mod inbound;

use std::sync::Arc;

use clap::Parser;
use config::Config;
use edgectl_model::CosRegistry;
use edgectl_monitor::StateUpdater;
use edgectl_northbound::{AppState, ConfigView};
use edgectl_protocol::{
    DecoyAddress, IngressDeps, ManagedPairs, PlacementConfig, PlacementDeps, Registry, Rendezvous,
    RequestStore, TopologyEventDeps,
};
use edgectl_selection::{NodeSelector, PathSelector};
use edgectl_topology::Topology;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::prelude::*;

/// Edge/fog network placement orchestrator.
#[derive(Parser, Debug)]
#[command(name = "edgectld", version)]
struct Args {
    /// Path to a YAML configuration file (`conf.yml`). Every field may
    /// also be set or overridden by the environment variable spec.md §6
    /// names for it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(
            format!("edgectl={default_level}").parse().unwrap_or(LevelFilter::INFO.into()),
        )
        .from_env_lossy();
    let stdout = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry().with(env_filter).with(stdout).init();
}

fn config_view(config: &Config) -> ConfigView {
    ConfigView {
        decoy_mac: config.decoy_mac.to_string(),
        decoy_ip: config.decoy_ip.to_string(),
        ofp_port: config.ofp_port,
        verbose: config.verbose,
        network_address: config.network_address.clone(),
        stp_enabled: config.stp_enabled,
        api_port: config.api_port,
        udp_port: config.udp_port,
        udp_timeout: config.udp_timeout.as_secs(),
        orchestrator_paths: config.orchestrator_paths,
        node_algorithm: config.node_algorithm_name.clone(),
        path_algorithm: config.path_algorithm_name.clone(),
        path_weight: config.path_weight_name.clone(),
        protocol_send_to: format!("{:?}", config.send_to).to_uppercase(),
        protocol_timeout: config.proto_timeout.as_secs(),
        protocol_retries: config.proto_retries,
        monitor_period: config.monitor_period.as_secs(),
        monitor_samples: config.monitor_samples,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    init_tracing(config.verbose);

    info!(
        api_port = config.api_port,
        udp_port = config.udp_port,
        orchestrator_paths = config.orchestrator_paths,
        "starting up"
    );

    // ===== core collaborators, spec.md §2/§5 =====
    let topology = Topology::new();
    let updater = StateUpdater::new(topology.clone(), config.monitor_period);
    let requests = RequestStore::new();
    let rendezvous = Rendezvous::new();
    let managed_pairs = ManagedPairs::new();
    let cos_registry = CosRegistry::new(config.cos.clone());
    let heartbeat_registry = Arc::new(Registry::new());
    let southbound: Arc<dyn edgectl_protocol::SouthboundAdapter> = Arc::new(adapter::LoggingAdapter);

    let node_selector = NodeSelector::new(config.node_algorithm);
    let path_selector = PathSelector::new(config.path_algorithm);

    let placement_deps = PlacementDeps {
        topology: topology.clone(),
        node_selector,
        path_selector,
        requests: requests.clone(),
        rendezvous: rendezvous.clone(),
        southbound: southbound.clone(),
        managed_pairs: managed_pairs.clone(),
    };
    let placement_config = PlacementConfig {
        orchestrator_paths: config.orchestrator_paths,
        path_weight: config.path_weight,
        proto_timeout: config.proto_timeout,
        proto_retries: config.proto_retries,
    };
    let ingress_deps = IngressDeps {
        topology: topology.clone(),
        requests: requests.clone(),
        rendezvous: rendezvous.clone(),
        southbound: southbound.clone(),
        cos_registry: cos_registry.clone(),
        placement: placement_deps,
    };
    let decoy = DecoyAddress { mac: config.decoy_mac, ip: config.decoy_ip };
    let event_deps = TopologyEventDeps {
        topology: topology.clone(),
        southbound: southbound.clone(),
        decoy_ip: config.decoy_ip,
    };

    // ===== background loops, spec.md §5 =====
    // The south-bound runtime this workspace doesn't implement (spec.md
    // §2's "out of scope" boundary) drives these two dispatchers from a
    // real datapath; `inbound` stands in for it over a JSON-lines socket
    // so both are reachable from the running daemon rather than only
    // from unit tests.
    let _inbound = inbound::spawn(
        config.ofp_port,
        inbound::InboundDeps { ingress: ingress_deps, decoy, placement_config, events: event_deps },
    );
    let _stitcher = edgectl_topology::stitcher::spawn(topology.clone());
    let _heartbeat = edgectl_topology::heartbeat::spawn(
        topology.clone(),
        heartbeat_registry.clone() as Arc<dyn edgectl_topology::heartbeat::HeartbeatSource>,
        config.udp_timeout,
    );
    let _ticks = updater.spawn_ticks();
    if let Err(error) = heartbeat_registry.listen(config.udp_port).await {
        tracing::error!(%error, port = config.udp_port, "failed to bind UDP heartbeat socket");
        std::process::exit(1);
    }

    // ===== northbound REST/metrics server, spec.md §6/§4.8 =====
    let state = AppState::new(topology, updater, requests, cos_registry, config_view(&config));
    let router = edgectl_northbound::router(state);
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.api_port)).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, port = config.api_port, "failed to bind northbound API socket");
            std::process::exit(1);
        }
    };

    info!(port = config.api_port, "northbound API listening");
    if let Err(error) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "northbound server exited with an error");
    }
    info!("shutting down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
