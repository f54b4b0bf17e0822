//! HTTP route handlers.

pub mod entity;
pub mod health;
pub mod helpers;

use axum::Router;

use crate::state::AppState;

/// All API routes, without middleware layers.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(entity::router())
}
