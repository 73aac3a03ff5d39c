//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! `GET /config`, spec.md §6: renders the running configuration so a
//! client can confirm what the orchestrator was started with.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::{AppState, ConfigView};

pub fn router() -> Router<AppState> {
    Router::new().route("/config", get(get_config))
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(state.config().clone())
}
