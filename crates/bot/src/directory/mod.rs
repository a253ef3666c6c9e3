//! Identity directory access.
//!
//! The workflow, snapshot cache and revocation workers only see the
//! [`Directory`] trait. [`CloudIdentityClient`] implements it against the
//! Cloud Identity v1beta1 REST API.

mod client;
mod error;
mod poller;
mod types;

use async_trait::async_trait;
use gatekeeper_core::{Email, GroupId, Membership, MembershipId, MembershipRole, OperationName};

pub use client::CloudIdentityClient;
pub use error::DirectoryError;
pub use poller::{OperationPoller, PollerConfig};
pub use types::{GroupResource, MembershipResource, Operation, OperationStatus};

/// Groups and memberships API.
#[async_trait]
pub trait Directory: Send + Sync {
    /// All groups under `parent` (`customers/{id}`), following pagination.
    async fn list_groups(&self, parent: &str) -> Result<Vec<GroupResource>, DirectoryError>;

    /// All memberships of a group, following pagination.
    async fn list_memberships(&self, group: &GroupId) -> Result<Vec<Membership>, DirectoryError>;

    /// Start creating a membership.
    async fn create_membership(
        &self,
        group: &GroupId,
        member: &Email,
        roles: &[MembershipRole],
    ) -> Result<Operation, DirectoryError>;

    /// Start deleting a membership.
    async fn delete_membership(&self, membership: &MembershipId)
    -> Result<Operation, DirectoryError>;

    /// Fetch the current state of an operation.
    async fn get_operation(&self, name: &OperationName) -> Result<Operation, DirectoryError>;
}
