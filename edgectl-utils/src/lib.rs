//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod mac_addr;
pub mod task;

use tokio::sync::mpsc;

pub use mac_addr::MacAddr;

/// Useful type definitions, mirroring the channel aliases used throughout
/// the workspace so call sites never spell out `mpsc::Sender<T>` directly.
pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Walks an error's `source()` chain and renders it as `"<err> (<cause>)"`,
/// used by every crate's `Error::log()` so nested I/O failures aren't
/// swallowed behind a generic message.
pub fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{error} ({})", with_source_dyn(source))
    } else {
        error.to_string()
    }
}

fn with_source_dyn(error: &(dyn std::error::Error + 'static)) -> String {
    if let Some(source) = error.source() {
        format!("{error} ({})", with_source_dyn(source))
    } else {
        error.to_string()
    }
}
