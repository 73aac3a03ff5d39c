//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    UnknownRequest(String),
    MalformedFrame(String),
    RejectedFrame(String),
}

impl Error {
    pub fn log(&self) {
        warn!("{}", self);
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownRequest(id) => write!(f, "unknown request '{id}'"),
            Error::MalformedFrame(reason) => write!(f, "malformed frame: {reason}"),
            Error::RejectedFrame(reason) => write!(f, "rejected frame: {reason}"),
        }
    }
}

impl std::error::Error for Error {}
