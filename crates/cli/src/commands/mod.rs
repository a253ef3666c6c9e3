//! CLI command implementations.

pub mod config;
pub mod directory;

use gatekeeper_bot::config::ConfigError;
use gatekeeper_bot::directory::DirectoryError;
use gatekeeper_core::EmailError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Directory call failed.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Invalid email argument.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}
