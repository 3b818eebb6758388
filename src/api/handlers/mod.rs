//! REST endpoint handlers organized by resource.
//!
//! Every handler opens one unit of work for the guild in the path, calls one
//! service operation and commits. An early `?` drops the unit of work, which
//! rolls it back.

pub mod group_wagers;
pub mod system;
pub mod users;
pub mod wagers;

use axum::Router;

use crate::app_state::AppState;
use crate::persistence::Store;

/// Composes all guild-scoped resource routes.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .merge(users::routes())
        .merge(wagers::routes())
        .merge(group_wagers::routes())
}
