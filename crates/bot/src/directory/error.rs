//! Identity directory errors.

use std::time::Duration;

use gatekeeper_core::OperationName;
use thiserror::Error;

/// Errors that can occur when talking to the identity directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// HTTP request failed before a response arrived.
    #[error("Directory request failed: {0}")]
    Request(String),

    /// The directory answered with a non-success status.
    #[error("Directory API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the directory.
        message: String,
    },

    /// Credentials could not be obtained.
    #[error("Directory authentication failed: {0}")]
    Auth(String),

    /// A long-running operation completed with an error.
    #[error("{0}")]
    Operation(String),

    /// A response or operation result could not be decoded.
    #[error("Failed to decode directory response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A long-running operation did not complete in time.
    #[error("Operation {operation} did not complete within {waited:?}")]
    Timeout {
        /// The operation being waited on.
        operation: OperationName,
        /// How long the poller waited.
        waited: Duration,
    },
}

impl DirectoryError {
    /// Message suitable for showing to users in a notice.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Operation(message) => message.clone(),
            Self::Timeout { .. } => "the directory did not finish the change in time".to_string(),
            other => other.to_string(),
        }
    }
}
