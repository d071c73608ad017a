//! REST endpoint handlers organized by resource.

pub mod payment;
pub mod seats;
pub mod system;
pub mod tickets;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes mounted under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(payment::routes())
        .merge(seats::routes())
        .merge(tickets::routes())
}
