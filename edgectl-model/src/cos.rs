//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Class-of-Service requirements a network application declares when
/// requesting a host, spec.md §3.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct CosSpecs {
    pub max_response_time: f64,
    pub min_concurrent_users: f64,
    pub min_req_per_sec: f64,
    pub min_bw: f64,
    pub max_delay: f64,
    pub max_jitter: f64,
    pub max_loss_rate: f64,
    pub min_cpu: f64,
    pub min_ram: f64,
    pub min_disk: f64,
}

#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Cos {
    pub id: u32,
    pub name: String,
    pub specs: CosSpecs,
}

/// Lookup table resolving a frame's `cos_id` to its declared
/// requirements, loaded once from configuration at startup. Grounded in
/// `original_source/server/ryu_apps/protocol.py`'s `cos_dict`, which
/// loads the same table from a database row set instead.
#[derive(Clone, Default)]
pub struct CosRegistry {
    by_id: Arc<HashMap<u32, Cos>>,
}

impl CosRegistry {
    pub fn new(entries: Vec<Cos>) -> Self {
        CosRegistry { by_id: Arc::new(entries.into_iter().map(|cos| (cos.id, cos)).collect()) }
    }

    pub fn get(&self, id: u32) -> Option<Cos> {
        self.by_id.get(&id).cloned()
    }
}
