//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (directory snapshot loaded)
//!
//! # Slack
//! POST /slack/events           - Events API (url_verification, app_mention)
//! POST /slack/interactions     - Interactivity (block_actions)
//! ```

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod slack;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(slack::router())
}
