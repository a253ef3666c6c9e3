//! Business logic services.
//!
//! # Services
//!
//! - `dispatcher` - Ordered consumption of inbound Slack events
//! - `grant_store` - Expiry timers for granted memberships
//! - `request_table` - TTL-bounded table of in-flight requests
//! - `revocation` - Worker pool deleting expired memberships
//! - `snapshot_cache` - Periodically refreshed view of the directory
//! - `workflow` - The membership request state machine

pub mod dispatcher;
pub mod grant_store;
pub mod request_table;
pub mod revocation;
pub mod snapshot_cache;
pub mod workflow;

pub use dispatcher::{
    ActionEvent, Command, Dispatcher, InboundEvent, Selections, event_channel, parse_command,
};
pub use grant_store::{GrantStore, RevocationJob};
pub use request_table::RequestTable;
pub use revocation::{revoke_membership, spawn_revocation_workers};
pub use snapshot_cache::SnapshotCache;
pub use workflow::{
    ClaimedApproval, Grant, Interaction, WorkflowDeps, WorkflowError, WorkflowService,
};
