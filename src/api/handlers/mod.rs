//! REST endpoint handlers organized by resource.

pub mod event;
pub mod heat;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().merge(event::routes()).merge(heat::routes())
}
