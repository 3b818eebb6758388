//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Guild-scoped endpoints are mounted under `/api/v1/guilds/{guild_id}`.
//! Errors render as `{ "error": { "code", "message", "kind" } }` via
//! [`crate::error::LedgerError`].

pub mod dto;
pub mod handlers;

use axum::Router;

use crate::app_state::AppState;
use crate::persistence::Store;

/// Builds the complete API router with all REST endpoints.
pub fn build_router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .nest("/api/v1/guilds/{guild_id}", handlers::routes())
        .merge(handlers::system::routes())
}
