//! Directory inspection and manual revocation.
//!
//! # Usage
//!
//! ```bash
//! # Which groups could this user be added to?
//! gk-cli groups --email alice@example.com --customer C0abc123
//!
//! # Remove a membership now instead of waiting for its expiry
//! gk-cli revoke --membership groups/abc/memberships/123
//! ```
//!
//! Both commands use application-default Google credentials.

use gatekeeper_bot::directory::{CloudIdentityClient, OperationPoller};
use gatekeeper_bot::services::{SnapshotCache, revoke_membership};
use gatekeeper_core::{Email, MembershipId};

use super::CommandError;

/// List the groups `email` belongs to and the ones it could be added to.
pub async fn groups(email: &str, customer_id: &str) -> Result<(), CommandError> {
    let email = Email::parse(email)?;
    let directory = CloudIdentityClient::from_environment().await?;

    tracing::info!("Loading directory for customer {customer_id}...");
    let snapshot = SnapshotCache::new()
        .refresh_once(&directory, customer_id)
        .await?;

    for group in &snapshot.groups {
        let status = if group.has_member(&email) {
            "member"
        } else {
            "eligible"
        };
        tracing::info!(group = %group.id, status, "{}", group.display_name);
    }

    tracing::info!(
        groups = snapshot.groups.len(),
        eligible = snapshot.eligible_groups(&email).len(),
        "Done"
    );
    Ok(())
}

/// Delete a membership and wait for the directory to confirm.
pub async fn revoke(membership: &str) -> Result<(), CommandError> {
    let membership = MembershipId::new(membership);
    let directory = CloudIdentityClient::from_environment().await?;

    tracing::info!("Revoking {membership}...");
    revoke_membership(&directory, &OperationPoller::default(), &membership).await?;
    tracing::info!("Membership {membership} revoked");
    Ok(())
}
