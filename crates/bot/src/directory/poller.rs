//! Waiting on long-running directory operations.

use std::time::Duration;

use gatekeeper_core::OperationName;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::error::DirectoryError;
use super::types::Operation;
use super::Directory;

/// Backoff and deadline for [`OperationPoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay before the first re-poll.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between polls.
    pub max_backoff: Duration,
    /// Give up after this long.
    pub deadline: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            deadline: Duration::from_secs(120),
        }
    }
}

/// Polls an operation until it is done, with exponential backoff.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationPoller {
    config: PollerConfig,
}

impl OperationPoller {
    /// Create a poller.
    #[must_use]
    pub const fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    /// Wait for `operation` to finish and return its result payload.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::Operation`] if the operation failed,
    /// [`DirectoryError::Timeout`] past the deadline, or any error from
    /// re-fetching the operation.
    #[instrument(skip(self, directory, operation), fields(operation = %operation.name))]
    pub async fn wait(
        &self,
        directory: &dyn Directory,
        mut operation: Operation,
    ) -> Result<Option<serde_json::Value>, DirectoryError> {
        let started = Instant::now();
        let mut backoff = self.config.initial_backoff;

        loop {
            if operation.done {
                if let Some(status) = operation.error {
                    return Err(DirectoryError::Operation(status.message));
                }
                debug!(elapsed = ?started.elapsed(), "Operation completed");
                return Ok(operation.response);
            }

            let name = OperationName::new(operation.name.clone());
            let waited = started.elapsed();
            if waited >= self.config.deadline || name.is_empty() {
                return Err(DirectoryError::Timeout {
                    operation: name,
                    waited,
                });
            }

            tokio::time::sleep(backoff.min(self.config.deadline - waited)).await;
            backoff = backoff.saturating_mul(2).min(self.config.max_backoff);

            operation = directory.get_operation(&name).await?;
        }
    }

    /// Wait for `operation` and decode its result as `T`.
    ///
    /// # Errors
    ///
    /// As [`Self::wait`], plus [`DirectoryError::Decode`] if the result is
    /// missing or not a `T`.
    pub async fn wait_for<T: DeserializeOwned>(
        &self,
        directory: &dyn Directory,
        operation: Operation,
    ) -> Result<T, DirectoryError> {
        let value = self.wait(directory, operation).await?;
        Ok(serde_json::from_value(
            value.unwrap_or(serde_json::Value::Null),
        )?)
    }
}
