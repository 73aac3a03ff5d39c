//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Configuration loading, spec.md §6/§9: every field in the table below
//! can be set from an optional YAML file (mirroring `original_source/
//! server/config.py`'s `conf.yml`) and is then overridable by an
//! environment variable of the exact name spec.md gives it. Hard
//! requirements (`CONTROLLER_DECOY_MAC`, `CONTROLLER_DECOY_IP`,
//! `NETWORK_ADDRESS`) fail startup when neither source supplies them,
//! spec.md §7. Grounded in `holo-daemon/src/config.rs`'s nested-struct
//! shape, adapted from TOML-with-sane-defaults to YAML-plus-env because
//! this system's source config (`conf.yml`) is itself YAML.

use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use edgectl_model::{Cos, CosSpecs};
use edgectl_selection::{NodeAlgorithm, PathAlgorithm, PathWeight};
use edgectl_utils::MacAddr;
use serde::Deserialize;
use tracing::{error, warn};

/// How protocol frames not addressed point-to-point reach the
/// orchestrator, spec.md §6's `PROTOCOL_SEND_TO`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum SendTo {
    #[default]
    None,
    Broadcast,
    Orchestrator,
}

impl SendTo {
    fn parse(name: &str) -> SendTo {
        match name.to_uppercase().as_str() {
            "" | "NONE" => SendTo::None,
            "BROADCAST" => SendTo::Broadcast,
            "ORCHESTRATOR" => SendTo::Orchestrator,
            other => {
                warn!(value = %other, "unknown PROTOCOL_SEND_TO, falling back to NONE");
                SendTo::None
            }
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct FileCos {
    id: u32,
    name: String,
    max_response_time: f64,
    min_concurrent_users: f64,
    min_req_per_sec: f64,
    min_bw: f64,
    max_delay: f64,
    max_jitter: f64,
    max_loss_rate: f64,
    min_cpu: f64,
    min_ram: f64,
    min_disk: f64,
}

/// The raw shape of an on-disk `conf.yml`. Every field is optional so a
/// partial file (or none at all) is valid; env vars fill whatever the
/// file leaves out, and [`Config::load`]'s own defaults fill the rest.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    controller_decoy_mac: Option<String>,
    controller_decoy_ip: Option<String>,
    controller_ofp_port: Option<u16>,
    controller_verbose: Option<bool>,
    network_address: Option<String>,
    network_stp_enabled: Option<bool>,
    orchestrator_api_port: Option<u16>,
    orchestrator_udp_port: Option<u16>,
    orchestrator_udp_timeout: Option<u64>,
    orchestrator_paths: Option<bool>,
    orchestrator_node_algorithm: Option<String>,
    orchestrator_path_algorithm: Option<String>,
    orchestrator_path_weight: Option<String>,
    protocol_send_to: Option<String>,
    protocol_timeout: Option<u64>,
    protocol_retries: Option<u32>,
    monitor_period: Option<u64>,
    monitor_samples: Option<usize>,
    cos: Vec<FileCos>,
}

/// The fully-resolved configuration a daemon run operates under. Every
/// scalar here is required: [`Config::load`] has already applied file
/// and environment overrides and defaults by the time this exists.
#[derive(Debug, Clone)]
pub struct Config {
    pub decoy_mac: MacAddr,
    pub decoy_ip: Ipv4Addr,
    pub ofp_port: u16,
    pub verbose: bool,
    pub network_address: String,
    pub stp_enabled: bool,
    pub api_port: u16,
    pub udp_port: u16,
    pub udp_timeout: Duration,
    pub orchestrator_paths: bool,
    pub node_algorithm: NodeAlgorithm,
    pub node_algorithm_name: String,
    pub path_algorithm: PathAlgorithm,
    pub path_algorithm_name: String,
    pub path_weight: PathWeight,
    pub path_weight_name: String,
    pub send_to: SendTo,
    pub proto_timeout: Duration,
    pub proto_retries: u32,
    pub monitor_period: Duration,
    pub monitor_samples: usize,
    pub cos: Vec<Cos>,
}

/// Reads `ENV_VAR`, falling back to `fallback` when unset or
/// unparseable (an unparseable value is logged and treated as absent,
/// rather than failing startup — only the three hard requirements do
/// that).
fn env_or<T: FromStr>(var: &str, fallback: Option<T>) -> Option<T> {
    match std::env::var(var) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%var, value = %raw, "ignoring unparseable environment override");
                fallback
            }
        },
        Err(_) => fallback,
    }
}

fn env_string(var: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(var).ok().or(fallback)
}

impl Config {
    /// Loads `path` (if given and present) as a YAML `conf.yml`, then
    /// applies spec.md §6's environment overrides on top, then fills in
    /// the documented defaults. Exits the process if a hard requirement
    /// (`CONTROLLER_DECOY_MAC`, `CONTROLLER_DECOY_IP`, `NETWORK_ADDRESS`)
    /// is still missing afterwards, spec.md §7.
    pub fn load(path: Option<&Path>) -> Config {
        let file = path
            .filter(|p| p.exists())
            .map(|p| std::fs::read_to_string(p).unwrap_or_default())
            .map(|raw| serde_yaml::from_str(&raw).unwrap_or_else(|error| {
                error!(%error, "failed to parse configuration file, ignoring it");
                FileConfig::default()
            }))
            .unwrap_or_default();

        let decoy_mac = env_string("CONTROLLER_DECOY_MAC", file.controller_decoy_mac)
            .and_then(|s| s.parse::<MacAddr>().ok());
        let decoy_ip = env_string("CONTROLLER_DECOY_IP", file.controller_decoy_ip)
            .and_then(|s| s.parse::<Ipv4Addr>().ok());
        let network_address = env_string("NETWORK_ADDRESS", file.network_address);

        let (Some(decoy_mac), Some(decoy_ip), Some(network_address)) =
            (decoy_mac, decoy_ip, network_address)
        else {
            error!("missing hard configuration requirement: CONTROLLER_DECOY_MAC, CONTROLLER_DECOY_IP and NETWORK_ADDRESS must all be set");
            std::process::exit(1);
        };

        let stp_enabled = env_or("NETWORK_STP_ENABLED", file.network_stp_enabled).unwrap_or(false);
        let send_to_raw = env_string("PROTOCOL_SEND_TO", file.protocol_send_to).unwrap_or_default();
        let mut send_to = SendTo::parse(&send_to_raw);
        if send_to == SendTo::Broadcast && !stp_enabled {
            warn!("PROTOCOL_SEND_TO=BROADCAST requires NETWORK_STP_ENABLED; downgrading to NONE");
            send_to = SendTo::None;
        }

        let node_algorithm_name = env_string("ORCHESTRATOR_NODE_ALGORITHM", file.orchestrator_node_algorithm)
            .unwrap_or_else(|| "SIMPLE".to_string());
        let path_algorithm_name = env_string("ORCHESTRATOR_PATH_ALGORITHM", file.orchestrator_path_algorithm)
            .unwrap_or_else(|| "DIJKSTRA".to_string());
        let path_weight_name = env_string("ORCHESTRATOR_PATH_WEIGHT", file.orchestrator_path_weight)
            .unwrap_or_else(|| "HOP".to_string());

        Config {
            decoy_mac,
            decoy_ip,
            ofp_port: env_or("CONTROLLER_OFP_PORT", file.controller_ofp_port).unwrap_or(6633),
            verbose: env_or("CONTROLLER_VERBOSE", file.controller_verbose).unwrap_or(false),
            network_address,
            stp_enabled,
            api_port: env_or("ORCHESTRATOR_API_PORT", file.orchestrator_api_port).unwrap_or(8080),
            udp_port: env_or("ORCHESTRATOR_UDP_PORT", file.orchestrator_udp_port).unwrap_or(7070),
            udp_timeout: Duration::from_secs(
                env_or("ORCHESTRATOR_UDP_TIMEOUT", file.orchestrator_udp_timeout).unwrap_or(3),
            ),
            orchestrator_paths: env_or("ORCHESTRATOR_PATHS", file.orchestrator_paths).unwrap_or(false),
            node_algorithm: NodeAlgorithm::parse(&node_algorithm_name),
            node_algorithm_name,
            path_algorithm: PathAlgorithm::parse(&path_algorithm_name),
            path_algorithm_name,
            path_weight: PathWeight::parse(&path_weight_name),
            path_weight_name,
            send_to,
            proto_timeout: Duration::from_secs(env_or("PROTOCOL_TIMEOUT", file.protocol_timeout).unwrap_or(1)),
            proto_retries: env_or("PROTOCOL_RETRIES", file.protocol_retries).unwrap_or(3),
            monitor_period: Duration::from_secs(env_or("MONITOR_PERIOD", file.monitor_period).unwrap_or(1)),
            monitor_samples: env_or("MONITOR_SAMPLES", file.monitor_samples).unwrap_or(2).max(2),
            cos: file
                .cos
                .into_iter()
                .map(|c| Cos {
                    id: c.id,
                    name: c.name,
                    specs: CosSpecs {
                        max_response_time: c.max_response_time,
                        min_concurrent_users: c.min_concurrent_users,
                        min_req_per_sec: c.min_req_per_sec,
                        min_bw: c.min_bw,
                        max_delay: c.max_delay,
                        max_jitter: c.max_jitter,
                        max_loss_rate: c.max_loss_rate,
                        min_cpu: c.min_cpu,
                        min_ram: c.min_ram,
                        min_disk: c.min_disk,
                    },
                })
                .collect(),
        }
    }
}
