//! Configuration check.
//!
//! # Usage
//!
//! ```bash
//! gk-cli check-config
//! ```

use gatekeeper_bot::config::BotConfig;

use super::CommandError;

/// Load the bot configuration exactly as the bot would and summarize it.
///
/// Secrets are never printed.
pub fn check() -> Result<(), CommandError> {
    let config = BotConfig::from_env()?;

    tracing::info!(
        listen = %config.socket_addr(),
        customer = %config.org_customer_id,
        approvers = %config.approver_group_id,
        snapshot_refresh_secs = config.snapshot_refresh.as_secs(),
        request_ttl_secs = config.request_ttl.as_secs(),
        revocation_workers = config.revocation_workers,
        operation_deadline_secs = config.poller.deadline.as_secs(),
        sentry = config.sentry_dsn.is_some(),
        "Configuration OK"
    );
    Ok(())
}
