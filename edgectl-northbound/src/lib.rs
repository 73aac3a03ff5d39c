//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The REST surface spec.md §6 names as an external collaborator:
//! `GET /config`, `POST /node`, `DELETE /node/{id}`, `PUT
//! /node_specs/{id}`, `POST /request`, and the `/metrics` Prometheus
//! text endpoint. Grounded in `RephlexZero-strata`'s `strata-control`
//! crate (axum + tower-http, one `AppState` clone per handler) but
//! without its database/JWT/websocket layers, which have no counterpart
//! here: `edgectl`'s authoritative state is the in-memory `Topology`
//! and `RequestStore`, not a database.

pub mod api;
pub mod error;
pub mod metrics;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::{AppState, ConfigView};

/// Builds the full router: the REST API plus `/metrics`, with request
/// tracing. `edgectl-daemon` binds this to a listener at `ORCHESTRATOR_API_PORT`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(api::router())
        .merge(metrics::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
