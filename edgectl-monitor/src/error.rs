//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Errors raised while fusing monitor/client readings into the
/// topology. Never fatal: spec.md §7 treats a reading for an unknown
/// entity as dropped-and-logged, not as a reason to kill the updater
/// task.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    UnknownNode(String),
    UnknownInterface(String, String),
    UnknownLink(String, String),
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
            Error::UnknownLink(src, dst) => write!(f, "unknown link '{src}'->'{dst}'"),
        }
    }
}

impl std::error::Error for Error {}
