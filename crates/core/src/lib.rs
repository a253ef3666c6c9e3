//! Gatekeeper Core - Shared types library.
//!
//! This crate provides common types used across all Gatekeeper components:
//! - `bot` - Slack approval bot granting time-limited group memberships
//! - `cli` - Operator tooling for inspecting the directory and revoking grants
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no timers. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype identifiers, emails, expirations, directory records
//!   and the approval request payload

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
