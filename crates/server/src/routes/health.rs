//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness check endpoint (verifies the store backend is reachable).
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    if state.store().ping().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
