//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Link-state derivation for spec.md §4.2's third tick loop: translate a
//! south-bound port-desc-stats feature state into [`edgectl_model::LinkState`]
//! for every link attached to that port, grounded in
//! `original_source/server/ryu_apps/topology_state.py::_update_link_state`.

use std::collections::HashMap;

use edgectl_model::{LinkState, NodeId};

/// Per-port feature state as reported by a south-bound port-desc-stats
/// reply (spec.md §6's `port-desc-stats-reply` event).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortFeatureState {
    Down,
    Blocked,
    Live,
}

impl PortFeatureState {
    pub fn to_link_state(self) -> LinkState {
        match self {
            PortFeatureState::Down => LinkState::Down,
            PortFeatureState::Blocked => LinkState::Blocked,
            PortFeatureState::Live => LinkState::Live,
        }
    }
}

type PortKey = (NodeId, String);

/// Latest known feature state per (node, port), fed by the south-bound
/// port-desc-stats-reply handler (out of scope for this crate).
#[derive(Default)]
pub struct PortFeatureTracker {
    features: HashMap<PortKey, PortFeatureState>,
}

impl PortFeatureTracker {
    pub fn new() -> Self {
        PortFeatureTracker::default()
    }

    pub fn set(&mut self, node_id: &str, port: &str, state: PortFeatureState) {
        self.features
            .insert((node_id.to_string(), port.to_string()), state);
    }

    pub fn forget_node(&mut self, node_id: &str) {
        self.features.retain(|(id, _), _| id != node_id);
    }

    /// Snapshot of every known (node, port, feature state) triple, for
    /// the tick loop to translate into link states.
    pub fn snapshot(&self) -> Vec<(NodeId, String, PortFeatureState)> {
        self.features
            .iter()
            .map(|((id, port), state)| (id.clone(), port.clone(), *state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_each_feature_state() {
        assert_eq!(PortFeatureState::Down.to_link_state(), LinkState::Down);
        assert_eq!(PortFeatureState::Blocked.to_link_state(), LinkState::Blocked);
        assert_eq!(PortFeatureState::Live.to_link_state(), LinkState::Live);
    }

    #[test]
    fn forgetting_a_node_drops_its_ports() {
        let mut tracker = PortFeatureTracker::new();
        tracker.set("sw1", "p1", PortFeatureState::Live);
        tracker.set("sw2", "p1", PortFeatureState::Live);
        tracker.forget_node("sw1");
        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "sw2");
    }
}
