//! REST API route tree, spec.md §6.

pub mod config;
pub mod node;
pub mod request;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().merge(config::router()).merge(node::router()).merge(request::router())
}
