//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The Request store: the authoritative, single-writer table of
//! in-flight and completed [`Request`]s, keyed by `(src_ip, req_id)` per
//! spec.md §4.4's "Lookup by (ip_src, req_id)".

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use edgectl_model::{Attempt, NodeRef, Request, RequestState};
use tokio::sync::RwLock;

type RequestKey = (Ipv4Addr, String);

/// Shared handle to the Request table, cheap to clone like [`edgectl_topology::Topology`].
#[derive(Clone)]
pub struct RequestStore {
    inner: Arc<RwLock<HashMap<RequestKey, Request>>>,
}

impl Default for RequestStore {
    fn default() -> Self {
        RequestStore::new()
    }
}

impl RequestStore {
    pub fn new() -> Self {
        RequestStore { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn get(&self, src_ip: Ipv4Addr, req_id: &str) -> Option<Request> {
        self.inner.read().await.get(&(src_ip, req_id.to_string())).cloned()
    }

    /// Looks up the Request by `(src_ip,req_id)`, creating it if unknown;
    /// if the existing Request is in state HREQ or HRES, resets it for a
    /// new attempt per spec.md §4.4's HREQ handling. Returns the attempt
    /// number to use for the new RREQ enumeration, or `None` if an
    /// in-flight attempt (already RREQ) should not be restarted.
    pub async fn begin_attempt(
        &self,
        src_ip: Ipv4Addr,
        req_id: &str,
        src: NodeRef,
        cos: Option<edgectl_model::Cos>,
        now: DateTime<Utc>,
    ) -> Option<(Request, u32)> {
        let mut inner = self.inner.write().await;
        let key = (src_ip, req_id.to_string());
        let entry = inner.entry(key).or_insert_with(|| Request::new(req_id.to_string(), src, now));

        if !matches!(entry.state, RequestState::Hreq | RequestState::Hres) {
            return None;
        }

        entry.cos = cos.or_else(|| entry.cos.clone());
        entry.host = None;
        entry.state = RequestState::Rreq;
        let attempt_no = entry.attempts.keys().next_back().map(|n| n + 1).unwrap_or(0);
        entry.attempts.insert(attempt_no, Attempt::new(req_id.to_string(), src_ip, attempt_no, now));
        Some((entry.clone(), attempt_no))
    }

    /// Applies `f` to the Request under the write lock, returning its
    /// result, or `None` if the Request is unknown. Used so a
    /// placement-task step (state check + mutation) is atomic per
    /// spec.md §5's ordering requirement.
    pub async fn with_mut<R>(
        &self,
        src_ip: Ipv4Addr,
        req_id: &str,
        f: impl FnOnce(&mut Request) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.write().await;
        let req = inner.get_mut(&(src_ip, req_id.to_string()))?;
        Some(f(req))
    }

    pub async fn state(&self, src_ip: Ipv4Addr, req_id: &str) -> Option<RequestState> {
        self.inner.read().await.get(&(src_ip, req_id.to_string())).map(|r| r.state)
    }

    pub async fn remove(&self, src_ip: Ipv4Addr, req_id: &str) -> Option<Request> {
        self.inner.write().await.remove(&(src_ip, req_id.to_string()))
    }

    pub async fn all(&self) -> Vec<Request> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Inserts `request` under `(src_ip, req_id)` unless a Request already
    /// exists there. Mirrors `Topology::add_node`'s idempotence-via-
    /// rejection pattern so REST ingest of a Request (spec.md §6 `POST
    /// /request`) can map a repeat post to the same 303 conflict response.
    pub async fn put_if_absent(&self, src_ip: Ipv4Addr, req_id: &str, request: Request) -> bool {
        let mut inner = self.inner.write().await;
        let key = (src_ip, req_id.to_string());
        if inner.contains_key(&key) {
            return false;
        }
        inner.insert(key, request);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, 1)
    }

    #[tokio::test]
    async fn begin_attempt_starts_a_new_attempt_once_the_prior_one_resolved() {
        let store = RequestStore::new();
        let (req, attempt_no) = store
            .begin_attempt(ip(), "req-1", NodeRef::Unknown(ip()), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(attempt_no, 0);
        assert_eq!(req.state, RequestState::Rreq);

        store.with_mut(ip(), "req-1", |r| r.state = RequestState::Hres).await;

        let (req2, attempt_no2) = store
            .begin_attempt(ip(), "req-1", NodeRef::Unknown(ip()), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(attempt_no2, 1);
        assert_eq!(req2.state, RequestState::Rreq);
    }

    #[tokio::test]
    async fn begin_attempt_refuses_while_already_reserving() {
        let store = RequestStore::new();
        store.begin_attempt(ip(), "req-2", NodeRef::Unknown(ip()), None, Utc::now()).await.unwrap();
        // state is now Rreq, a second HREQ must not restart the attempt count
        let second = store.begin_attempt(ip(), "req-2", NodeRef::Unknown(ip()), None, Utc::now()).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn put_if_absent_rejects_a_repeat_post() {
        let store = RequestStore::new();
        let req = Request::new("req-3".to_string(), NodeRef::Unknown(ip()), Utc::now());
        assert!(store.put_if_absent(ip(), "req-3", req.clone()).await);
        assert!(!store.put_if_absent(ip(), "req-3", req).await);
    }
}
