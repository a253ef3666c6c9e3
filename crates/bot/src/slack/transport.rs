//! Chat transport seam.
//!
//! The workflow talks to Slack only through [`ChatTransport`], so tests can
//! substitute a recording implementation.

use async_trait::async_trait;
use gatekeeper_core::{ChannelId, Email, UserGroupId, UserId};

use super::error::SlackError;
use super::types::Message;

/// What to do with the message an interaction came from.
#[derive(Debug, Clone)]
pub enum ResponseAction {
    /// Replace the source message with new content.
    Replace(Message),
    /// Delete the source message.
    Delete,
    /// Post a message visible only to the acting user.
    Ephemeral(Message),
}

/// Outbound chat operations used by the workflow.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message visible to the whole channel.
    async fn post_message(&self, channel: &ChannelId, message: Message) -> Result<(), SlackError>;

    /// Post a message visible only to `user`.
    async fn post_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        message: Message,
    ) -> Result<(), SlackError>;

    /// Answer an interaction through its response URL.
    async fn respond(&self, response_url: &str, response: ResponseAction) -> Result<(), SlackError>;

    /// Email address of a workspace user, if visible.
    async fn user_email(&self, user: &UserId) -> Result<Option<Email>, SlackError>;

    /// Members of a Slack user group.
    async fn usergroup_members(&self, group: &UserGroupId) -> Result<Vec<UserId>, SlackError>;
}
