//! HTTP boundary errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::slack::SlackError;

/// Error returned by the Slack callback handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request could not be parsed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request signature missing or invalid.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Event queue is full or closed; Slack will retry.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SlackError> for AppError {
    fn from(err: SlackError) -> Self {
        match err {
            SlackError::InvalidSignature(msg) => Self::Unauthorized(msg),
            SlackError::InvalidPayload(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server errors with Sentry
        if matches!(self, Self::Internal(_) | Self::Unavailable(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Slack callback error"
            );
        } else {
            tracing::warn!(error = %self, "Rejected Slack callback");
        }

        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Unavailable(_) => "Service unavailable".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}
