//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Node and path selection algorithms for network applications, based on
//! their [`edgectl_model::Cos`] requirements. Both selectors are
//! Strategy-pattern dispatched by name, mirroring
//! `original_source/server/selection.py`: a mis-named algorithm falls
//! back to the default and logs a warning rather than failing the
//! request outright (spec.md §4.3/§7).

pub mod node;
pub mod path;

pub use node::{NodeAlgorithm, NodeSelector};
pub use path::{PathAlgorithm, PathCandidate, PathSelector, PathWeight};

/// How many results a selector should return.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    /// Every match, ordered ascending by the selector's own ranking.
    All,
    /// The first match encountered (node order / target order).
    First,
    /// The single best-ranked match.
    Best,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Strategy> {
        match s.to_uppercase().as_str() {
            "ALL" => Some(Strategy::All),
            "FIRST" => Some(Strategy::First),
            "BEST" => Some(Strategy::Best),
            _ => None,
        }
    }
}
