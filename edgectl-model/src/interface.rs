//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use edgectl_utils::MacAddr;
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Resource readings for an [`Interface`]. Per spec.md §3 invariant (v),
/// free bandwidth defaults to 0 until a reading arrives.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceSpecs {
    pub capacity: f64,
    pub bw_up: f64,
    pub bw_down: f64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub ts: Option<DateTime<Utc>>,
}

/// Field-wise update for [`InterfaceSpecs`]; `recv_bps`, when set, opens
/// the iperf window described in spec.md §4.2 and is not itself stored
/// (it is a directive, not a reading).
#[derive(Clone, Copy, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceSpecsUpdate {
    pub capacity: Option<f64>,
    pub bw_up: Option<f64>,
    pub bw_down: Option<f64>,
    pub tx_packets: Option<u64>,
    pub rx_packets: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_bytes: Option<u64>,
    pub recv_bps: Option<f64>,
}

impl InterfaceSpecs {
    /// Applies `update` field-wise, respecting invariant (iii) (monotonic
    /// timestamp). Returns `false` if `ts` is older than the stored one.
    pub fn apply(&mut self, update: &InterfaceSpecsUpdate, ts: DateTime<Utc>) -> bool {
        if let Some(current) = self.ts {
            if ts < current {
                return false;
            }
        }
        if let Some(v) = update.capacity {
            self.capacity = v;
        }
        if let Some(v) = update.bw_up {
            self.bw_up = v;
        }
        if let Some(v) = update.bw_down {
            self.bw_down = v;
        }
        if let Some(v) = update.tx_packets {
            self.tx_packets = v;
        }
        if let Some(v) = update.rx_packets {
            self.rx_packets = v;
        }
        if let Some(v) = update.tx_bytes {
            self.tx_bytes = v;
        }
        if let Some(v) = update.rx_bytes {
            self.rx_bytes = v;
        }
        self.ts = Some(ts);
        true
    }
}

/// A network interface owned by a [`crate::Node`]. Switch interfaces
/// carry an OpenFlow port number (`num`); host interfaces used only to
/// address the host may lack one, but instead carry `attached_to`: the
/// (switch id, switch port number) a south-bound host-add event reported
/// them behind, consumed by the host-link stitcher (spec.md §4.1).
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Interface {
    pub name: String,
    pub num: Option<u32>,
    pub mac: Option<MacAddr>,
    pub ipv4: Option<Ipv4Addr>,
    pub attached_to: Option<(NodeId, u32)>,
    pub specs: InterfaceSpecs,
}

impl Interface {
    pub fn new(name: String) -> Self {
        Interface {
            name,
            num: None,
            mac: None,
            ipv4: None,
            attached_to: None,
            specs: InterfaceSpecs::default(),
        }
    }
}

/// Refers to an interface either by its name or by its OpenFlow port
/// number, the two lookup keys spec.md §4.1 allows for
/// `get_link_at_port`/`get_links_at_port`/`get_dst_at_port`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortRef<'a> {
    Name(&'a str),
    Num(u32),
}
