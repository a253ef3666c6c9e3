//! Slack integration for membership requests.
//!
//! This module provides:
//! - [`SlackClient`], the Web API implementation of [`ChatTransport`]
//! - Block Kit types for prompts and notices
//! - Message builders for every step of the request flow
//! - Request signature verification for inbound callbacks
//!
//! # Flow
//!
//! 1. A user mentions the bot with `add member`
//! 2. The requester picks a nominee, then a group and an expiration
//! 3. The approver user group is asked to Allow or Deny
//! 4. On Allow the membership is created and later revoked on expiry

mod client;
mod error;
pub mod messages;
mod signature;
mod transport;
mod types;

pub use client::SlackClient;
pub use error::SlackError;
pub use signature::SignatureVerifier;
pub use transport::{ChatTransport, ResponseAction};
pub use types::{
    ActionElement, Attachment, AttachmentColor, Block, BlockState, ButtonStyle, CallbackEvent,
    ContextElement, EventEnvelope, InteractionAction, InteractionPayload, InteractionUser,
    Message, PlainText, SelectOption, StateValue, Text,
};
