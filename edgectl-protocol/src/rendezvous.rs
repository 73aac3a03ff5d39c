//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The timed reply-rendezvous of spec.md §4.4/§5: a placement task sends
//! a frame and waits for the matching reply (or a cancellation) for up
//! to `PROTO_TIMEOUT`, keyed by `(ip_src, req_id, host_mac)`. Grounded
//! in `original_source/server/ryu_apps/protocol.py`'s `_srp1`, which
//! pairs a `threading.Event` per outstanding request with a dict the
//! frame handler populates before waking it.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use edgectl_utils::MacAddr;
use tokio::sync::{oneshot, Mutex};

use crate::frame::Frame;

type Key = (Ipv4Addr, String, MacAddr);

/// Holds the one-shot reply channel for every outstanding wait.
#[derive(Clone, Default)]
pub struct Rendezvous {
    waiters: Arc<Mutex<HashMap<Key, oneshot::Sender<Frame>>>>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Rendezvous::default()
    }

    /// Registers a wait for a reply to `(src_ip,req_id,host_mac)` and
    /// blocks until either a matching frame is delivered via
    /// [`Rendezvous::deliver`], or `timeout` elapses (`None`).
    pub async fn wait(&self, src_ip: Ipv4Addr, req_id: &str, host_mac: MacAddr, timeout: Duration) -> Option<Frame> {
        let key = (src_ip, req_id.to_string(), host_mac);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(key.clone(), tx);

        let result = tokio::time::timeout(timeout, rx).await;
        self.waiters.lock().await.remove(&key);
        result.ok()?.ok()
    }

    /// Delivers `frame` to the waiter keyed by `(src_ip,req_id,host_mac)`,
    /// if one is currently waiting. Returns whether a waiter was woken.
    pub async fn deliver(&self, src_ip: Ipv4Addr, req_id: &str, host_mac: MacAddr, frame: Frame) -> bool {
        let key = (src_ip, req_id.to_string(), host_mac);
        if let Some(tx) = self.waiters.lock().await.remove(&key) {
            return tx.send(frame).is_ok();
        }
        false
    }
}
