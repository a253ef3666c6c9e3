//! Core types for Gatekeeper.
//!
//! This module provides type-safe wrappers for directory and workflow concepts.

pub mod directory;
pub mod email;
pub mod expiration;
pub mod id;
pub mod request;

pub use directory::{DirectorySnapshot, GrantRecord, Group, Membership, MembershipRole};
pub use email::{Email, EmailError};
pub use expiration::{Expiration, ExpirationError};
pub use id::*;
pub use request::{
    ApprovalRequest, Nominee, PayloadError, PendingRequest, TransitionError, WorkflowState,
};
