//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Errors raised while mutating the topology. These never abort the
/// caller's task: spec.md §7 classifies malformed or unknown-entity
/// input as locally rejected, not fatal.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    UnknownNode(String),
    UnknownInterface(String, String),
    NodeAlreadyExists(String),
}

impl Error {
    pub fn log(&self) {
        warn!("{}", self);
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownNode(id) => write!(f, "unknown node '{id}'"),
            Error::UnknownInterface(node, name) => {
                write!(f, "unknown interface '{name}' on node '{node}'")
            }
            Error::NodeAlreadyExists(id) => write!(f, "node '{id}' already exists"),
        }
    }
}

impl std::error::Error for Error {}
