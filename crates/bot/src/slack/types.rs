//! Slack Block Kit and callback types.
//!
//! These types represent the subset of Slack Block Kit and
//! of the Events API / interactivity payloads that the membership workflow
//! needs.
//!
//! See: <https://api.slack.com/block-kit>

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Outbound Messages
// =============================================================================

/// Message content: blocks, legacy attachments and a fallback text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Message {
    /// Plain text fallback (notifications, accessibility).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Message blocks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    /// Colored attachments used for notices.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// A message made of blocks only.
    #[must_use]
    pub const fn blocks(blocks: Vec<Block>) -> Self {
        Self {
            text: None,
            blocks,
            attachments: Vec::new(),
        }
    }

    /// A message made of a single colored attachment.
    #[must_use]
    pub fn notice(text: impl Into<String>, color: AttachmentColor) -> Self {
        Self {
            text: None,
            blocks: Vec::new(),
            attachments: vec![Attachment::new(text, color)],
        }
    }

    /// Append an attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Set the fallback text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A legacy attachment, used for the colored bar on notices.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    /// Attachment body (mrkdwn).
    pub text: String,
    /// Bar color.
    pub color: AttachmentColor,
}

impl Attachment {
    /// Create an attachment.
    #[must_use]
    pub fn new(text: impl Into<String>, color: AttachmentColor) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Attachment bar color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentColor {
    /// Green.
    Good,
    /// Red.
    Danger,
}

/// Block Kit block types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Section block with text.
    Section { text: Text },
    /// Context block with small muted text.
    Context { elements: Vec<ContextElement> },
    /// Actions block with interactive elements.
    Actions {
        block_id: String,
        elements: Vec<ActionElement>,
    },
    /// Divider block (horizontal line).
    Divider,
}

/// Text object types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Text {
    /// Plain text (no formatting).
    PlainText { text: String, emoji: bool },
    /// Markdown text (supports formatting).
    Mrkdwn { text: String },
}

impl Text {
    /// Create a plain text object.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText {
            text: text.into(),
            emoji: true,
        }
    }

    /// Create a markdown text object.
    #[must_use]
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    /// The raw text regardless of format.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText { text, .. } | Self::Mrkdwn { text } => text,
        }
    }
}

/// Plain text object (labels, placeholders).
#[derive(Debug, Clone, Serialize)]
pub struct PlainText {
    #[serde(rename = "type")]
    pub text_type: &'static str,
    pub text: String,
    pub emoji: bool,
}

impl PlainText {
    /// Create a new plain text object.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text_type: "plain_text",
            text: text.into(),
            emoji: true,
        }
    }
}

/// Context block elements.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextElement {
    /// Markdown text in context.
    Mrkdwn { text: String },
}

/// An option of a static select menu.
#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    /// Label shown to the user.
    pub text: PlainText,
    /// Value reported back on selection.
    pub value: String,
}

impl SelectOption {
    /// Create an option.
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: PlainText::new(label),
            value: value.into(),
        }
    }
}

/// Action block elements.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionElement {
    /// Interactive button.
    Button {
        text: PlainText,
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        style: Option<ButtonStyle>,
    },
    /// Workspace user picker.
    UsersSelect {
        placeholder: PlainText,
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_user: Option<String>,
    },
    /// Select menu with a fixed list of options.
    StaticSelect {
        placeholder: PlainText,
        action_id: String,
        options: Vec<SelectOption>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_option: Option<SelectOption>,
    },
}

impl ActionElement {
    /// The element's action ID.
    #[must_use]
    pub fn action_id(&self) -> &str {
        match self {
            Self::Button { action_id, .. }
            | Self::UsersSelect { action_id, .. }
            | Self::StaticSelect { action_id, .. } => action_id,
        }
    }
}

/// Button style (affects color).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    /// Green primary button.
    Primary,
    /// Red danger button.
    Danger,
}

// =============================================================================
// Response Types
// =============================================================================

/// Minimal envelope every Web API method returns.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    /// Whether the request was successful.
    pub ok: bool,
    /// Error code if not ok.
    #[serde(default)]
    pub error: Option<String>,
}

/// Response from `users.info`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user: Option<SlackUser>,
}

/// A workspace user.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub profile: UserProfile,
}

/// Profile fields of a user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    /// Only present with the `users:read.email` scope.
    #[serde(default)]
    pub email: Option<String>,
}

/// Response from `usergroups.users.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserGroupUsersResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

// =============================================================================
// Events API
// =============================================================================

/// Outer envelope of an Events API request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    /// Endpoint ownership handshake.
    UrlVerification { challenge: String },
    /// A subscribed event.
    EventCallback { event: CallbackEvent },
    /// Anything else (rate limiting notices, app uninstall...).
    #[serde(other)]
    Other,
}

/// Inner event of an `event_callback`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackEvent {
    /// The bot was mentioned in a channel.
    AppMention {
        user: String,
        channel: String,
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

// =============================================================================
// Interactivity
// =============================================================================

/// Slack interaction payload from button clicks and select menus.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionPayload {
    /// Type of interaction (`block_actions`, ...).
    #[serde(rename = "type")]
    pub interaction_type: String,
    /// User who triggered the interaction.
    pub user: InteractionUser,
    /// Channel where interaction occurred.
    #[serde(default)]
    pub channel: Option<InteractionChannel>,
    /// Container information.
    #[serde(default)]
    pub container: Option<InteractionContainer>,
    /// Actions that were triggered.
    #[serde(default)]
    pub actions: Vec<InteractionAction>,
    /// Current values of every input in the message.
    #[serde(default)]
    pub state: Option<BlockState>,
    /// Response URL for replacing or deleting the source message.
    #[serde(default)]
    pub response_url: Option<String>,
}

/// User who triggered an interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionUser {
    /// Slack user ID.
    pub id: String,
    /// Username.
    #[serde(default)]
    pub username: Option<String>,
}

/// Container for the interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionContainer {
    /// Container type (e.g., "message").
    #[serde(rename = "type")]
    pub container_type: String,
    /// Channel ID.
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Channel where interaction occurred.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionChannel {
    /// Channel ID.
    pub id: String,
}

/// Action that was triggered.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionAction {
    /// Action ID (set when creating the element).
    pub action_id: String,
    /// Block ID containing this action.
    #[serde(default)]
    pub block_id: Option<String>,
    /// Value attached to the action (buttons).
    #[serde(default)]
    pub value: Option<String>,
    /// Action type.
    #[serde(rename = "type")]
    pub action_type: String,
}

/// Input state of a message: block ID -> action ID -> value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockState {
    #[serde(default)]
    pub values: HashMap<String, HashMap<String, StateValue>>,
}

impl BlockState {
    /// Look up the state of one element.
    #[must_use]
    pub fn value(&self, block_id: &str, action_id: &str) -> Option<&StateValue> {
        self.values.get(block_id)?.get(action_id)
    }
}

/// Current value of one input element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateValue {
    /// User picked in a `users_select`.
    #[serde(default)]
    pub selected_user: Option<String>,
    /// Option picked in a `static_select`.
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
}

/// An option picked in a select menu.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOption {
    pub value: String,
    pub text: SelectedOptionText,
}

/// Label of a picked option.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOptionText {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_skips_empty_fields() {
        let json = serde_json::to_value(Message::notice("hi", AttachmentColor::Good))
            .expect("serialize");
        assert!(json.get("blocks").is_none());
        assert!(json.get("text").is_none());
        assert_eq!(json["attachments"][0]["color"], "good");
    }

    #[test]
    fn test_select_elements_serialize_with_type_tags() {
        let element = ActionElement::StaticSelect {
            placeholder: PlainText::new("Select a group"),
            action_id: "select-group".to_string(),
            options: vec![SelectOption::new("G1", "groups/g1")],
            initial_option: None,
        };
        let json = serde_json::to_value(&element).expect("serialize");
        assert_eq!(json["type"], "static_select");
        assert_eq!(json["options"][0]["value"], "groups/g1");
        assert!(json.get("initial_option").is_none());

        let element = ActionElement::UsersSelect {
            placeholder: PlainText::new("Select a user"),
            action_id: "select-user".to_string(),
            initial_user: Some("U1".to_string()),
        };
        let json = serde_json::to_value(&element).expect("serialize");
        assert_eq!(json["type"], "users_select");
        assert_eq!(json["initial_user"], "U1");
    }

    #[test]
    fn test_event_envelope_variants() {
        let envelope: EventEnvelope =
            serde_json::from_str(r#"{"type":"url_verification","challenge":"abc","token":"t"}"#)
                .expect("parse");
        assert!(matches!(envelope, EventEnvelope::UrlVerification { challenge } if challenge == "abc"));

        let envelope: EventEnvelope = serde_json::from_str(
            r#"{"type":"event_callback","event":{"type":"app_mention","user":"U1","channel":"C1","text":"<@B> add member","ts":"1"}}"#,
        )
        .expect("parse");
        assert!(matches!(
            envelope,
            EventEnvelope::EventCallback {
                event: CallbackEvent::AppMention { .. }
            }
        ));

        let envelope: EventEnvelope =
            serde_json::from_str(r#"{"type":"app_rate_limited"}"#).expect("parse");
        assert!(matches!(envelope, EventEnvelope::Other));
    }

    #[test]
    fn test_interaction_state_lookup() {
        let payload: InteractionPayload = serde_json::from_str(
            r#"{
                "type": "block_actions",
                "user": {"id": "U1"},
                "channel": {"id": "C1"},
                "response_url": "https://hooks.slack.com/actions/x",
                "actions": [{"action_id": "submit-adding-user", "block_id": "add-user", "type": "button", "value": "v"}],
                "state": {"values": {"add-user": {
                    "select-group": {"type": "static_select", "selected_option": {"value": "groups/g2", "text": {"type": "plain_text", "text": "G2"}}},
                    "select-expiration": {"type": "static_select", "selected_option": null}
                }}}
            }"#,
        )
        .expect("parse");

        let state = payload.state.expect("state");
        let group = state
            .value("add-user", "select-group")
            .and_then(|v| v.selected_option.as_ref())
            .expect("group selected");
        assert_eq!(group.value, "groups/g2");
        assert_eq!(group.text.text, "G2");
        assert!(
            state
                .value("add-user", "select-expiration")
                .and_then(|v| v.selected_option.as_ref())
                .is_none()
        );
    }
}
