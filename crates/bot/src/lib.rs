//! Gatekeeper bot library.
//!
//! A Slack bot that grants time-limited Cloud Identity group memberships
//! after approval by a designated Slack user group. Exposed as a library so
//! the integration tests can drive the workflow against in-memory fakes.
//!
//! # Security
//!
//! The bot's service account can add anyone to any group of the customer.
//! Every approval is gated on membership of the approver user group.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod directory;
pub mod error;
pub mod routes;
pub mod services;
pub mod slack;
pub mod state;
