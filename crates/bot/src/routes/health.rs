//! Liveness and readiness checks.

use axum::{Router, extract::State, http::StatusCode, routing::get};

use crate::state::AppState;

/// Create health check routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable until the first directory snapshot has
/// been loaded, since no request can be served without it.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.snapshots().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
