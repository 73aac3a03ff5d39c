//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! UDP heartbeat receiver, spec.md §6/§5: a client sends its node id as
//! a UDP datagram to `ORCHESTRATOR_UDP_PORT`; the registry stamps
//! `clients[id] = now` on receipt. Grounded in
//! `original_source/server/udp_server.py`'s `UDPHandler`/`clients` dict.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use edgectl_topology::heartbeat::HeartbeatSource;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Shared last-seen table, implementing [`HeartbeatSource`] so
/// `edgectl-topology`'s heartbeat-prune loop can read it without a
/// dependency on this crate.
#[derive(Clone, Default)]
pub struct Registry {
    clients: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn touch(&self, node_id: &str) {
        self.clients.lock().unwrap().insert(node_id.to_string(), Instant::now());
    }

    /// Binds a UDP socket on `port` and spawns the receive loop as a
    /// detached task, returning immediately. Each datagram's payload,
    /// trimmed and UTF-8 decoded, is taken as the sending node's id.
    pub async fn listen(self: &Arc<Self>, port: u16) -> io::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        let registry = self.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => match std::str::from_utf8(&buf[..len]) {
                        Ok(id) => {
                            let id = id.trim();
                            debug!(node = %id, %from, "heartbeat received");
                            registry.touch(id);
                        }
                        Err(_) => warn!(%from, "dropping heartbeat: payload is not valid UTF-8"),
                    },
                    Err(error) => warn!(%error, "heartbeat socket recv failed"),
                }
            }
        });
        Ok(())
    }
}

impl HeartbeatSource for Registry {
    fn last_seen(&self, node_id: &str) -> Option<Instant> {
        self.clients.lock().unwrap().get(node_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_last_seen_round_trips() {
        let registry = Registry::new();
        assert!(registry.last_seen("h1").is_none());
        registry.touch("h1");
        assert!(registry.last_seen("h1").is_some());
    }
}
