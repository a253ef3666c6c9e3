//! Slack message builders for the membership request flow.
//!
//! Provides factory functions for:
//! - The nominee and group/expiration prompts shown to the requester
//! - The approval request addressed to the approver user group
//! - Colored notices for every outcome

use gatekeeper_core::{ApprovalRequest, Expiration, GroupId, RequestId, UserGroupId, UserId};

use super::types::{
    ActionElement, Attachment, AttachmentColor, Block, ButtonStyle, ContextElement, Message, PlainText,
    SelectOption, Text,
};

/// Block ID shared by every actions block of the flow.
pub const ADD_USER_BLOCK_ID: &str = "add-user";

/// Action IDs.
pub mod action {
    pub const SELECT_USER: &str = "select-user";
    pub const SUBMIT_SELECTING_USER: &str = "submit-selecting-user";
    pub const SELECT_GROUP: &str = "select-group";
    pub const SELECT_EXPIRATION: &str = "select-expiration";
    pub const SUBMIT_ADDING_USER: &str = "submit-adding-user";
    pub const ALLOW_ADDING_USER: &str = "accept-adding-user";
    pub const DENY_ADDING_USER: &str = "deny-adding-user";
    pub const CANCEL: &str = "cancel";
}

const MUST_SELECT: &str = "Must be selected before submission :warning:";

fn button(label: &str, action_id: &str, value: String, style: ButtonStyle) -> ActionElement {
    ActionElement::Button {
        text: PlainText::new(label),
        action_id: action_id.to_string(),
        value: Some(value),
        style: Some(style),
    }
}

fn submit_button(action_id: &str, request_id: RequestId) -> ActionElement {
    button("submit", action_id, request_id.to_string(), ButtonStyle::Primary)
}

fn cancel_button(request_id: RequestId) -> ActionElement {
    button(
        action::CANCEL,
        action::CANCEL,
        request_id.to_string(),
        ButtonStyle::Danger,
    )
}

// =============================================================================
// Prompts
// =============================================================================

/// Ephemeral user picker, preselected on the requester.
#[must_use]
pub fn build_nominee_prompt(request_id: RequestId, initial_user: &UserId) -> Message {
    Message::blocks(vec![Block::Actions {
        block_id: ADD_USER_BLOCK_ID.to_string(),
        elements: vec![
            ActionElement::UsersSelect {
                placeholder: PlainText::new("Select an user"),
                action_id: action::SELECT_USER.to_string(),
                initial_user: Some(initial_user.to_string()),
            },
            submit_button(action::SUBMIT_SELECTING_USER, request_id),
            cancel_button(request_id),
        ],
    }])
    .with_text("Who should be added to a group?")
}

/// Nominee prompt with a validation warning.
#[must_use]
pub fn build_nominee_prompt_invalid(request_id: RequestId, initial_user: &UserId) -> Message {
    build_nominee_prompt(request_id, initial_user).with_attachment(warning(MUST_SELECT))
}

fn expiration_option(expiration: Expiration) -> SelectOption {
    SelectOption::new(expiration.label(), expiration.value())
}

/// Ephemeral group and expiration picker.
///
/// Previous selections are carried as initial options so a re-render after
/// a validation failure keeps them visible.
#[must_use]
pub fn build_group_prompt(
    request_id: RequestId,
    nominee: &UserId,
    groups: &[(GroupId, String)],
    selected_group: Option<&(GroupId, String)>,
    selected_expiration: Option<Expiration>,
) -> Message {
    if groups.is_empty() {
        return Message::blocks(vec![
            Block::Section {
                text: Text::mrkdwn(format!(
                    "<@{nominee}> is already a member of every group :information_source:"
                )),
            },
            Block::Actions {
                block_id: ADD_USER_BLOCK_ID.to_string(),
                elements: vec![cancel_button(request_id)],
            },
        ]);
    }

    let options: Vec<SelectOption> = groups
        .iter()
        .map(|(id, name)| SelectOption::new(name.clone(), id.to_string()))
        .collect();
    let initial_group = selected_group
        .filter(|(id, _)| groups.iter().any(|(g, _)| g == id))
        .map(|(id, name)| SelectOption::new(name.clone(), id.to_string()));

    Message::blocks(vec![
        Block::Section {
            text: Text::mrkdwn(format!("Select a group and expiration for <@{nominee}>.")),
        },
        Block::Actions {
            block_id: ADD_USER_BLOCK_ID.to_string(),
            elements: vec![
                ActionElement::StaticSelect {
                    placeholder: PlainText::new("Select a group"),
                    action_id: action::SELECT_GROUP.to_string(),
                    options,
                    initial_option: initial_group,
                },
                ActionElement::StaticSelect {
                    placeholder: PlainText::new("Select an expiration"),
                    action_id: action::SELECT_EXPIRATION.to_string(),
                    options: Expiration::ALL.iter().copied().map(expiration_option).collect(),
                    initial_option: selected_expiration.map(expiration_option),
                },
                submit_button(action::SUBMIT_ADDING_USER, request_id),
                cancel_button(request_id),
            ],
        },
    ])
}

/// Group prompt with a validation warning.
#[must_use]
pub fn build_group_prompt_invalid(
    request_id: RequestId,
    nominee: &UserId,
    groups: &[(GroupId, String)],
    selected_group: Option<&(GroupId, String)>,
    selected_expiration: Option<Expiration>,
) -> Message {
    build_group_prompt(
        request_id,
        nominee,
        groups,
        selected_group,
        selected_expiration,
    )
    .with_attachment(warning(MUST_SELECT))
}

// =============================================================================
// Approval Request
// =============================================================================

/// Channel message asking the approver group to allow or deny a request.
///
/// Allow and Deny carry the full encoded request; Cancel carries only the
/// request ID.
#[must_use]
pub fn build_approval_request(payload: &ApprovalRequest, approvers: &UserGroupId) -> Message {
    let value = payload.encode();
    let text = format!(
        "Requested from <@{}>.\n<!subteam^{approvers}> allows <@{}> to join the `{}` group with an expiration time of `{}`?",
        payload.requested_user_id,
        payload.adding_user_id,
        payload.group_name,
        payload.expiration,
    );

    Message::blocks(vec![
        Block::Section {
            text: Text::mrkdwn(text),
        },
        Block::Context {
            elements: vec![ContextElement::Mrkdwn {
                text: format!("Request `{}`", payload.request_id),
            }],
        },
        Block::Actions {
            block_id: ADD_USER_BLOCK_ID.to_string(),
            elements: vec![
                button(
                    "Allow",
                    action::ALLOW_ADDING_USER,
                    value.clone(),
                    ButtonStyle::Primary,
                ),
                button("Deny", action::DENY_ADDING_USER, value, ButtonStyle::Danger),
                cancel_button(payload.request_id),
            ],
        },
    ])
    .with_text(format!(
        "Membership request for the {} group",
        payload.group_name
    ))
}

// =============================================================================
// Notices
// =============================================================================

fn success(text: impl Into<String>) -> Attachment {
    Attachment::new(text, AttachmentColor::Good)
}

fn warning(text: impl Into<String>) -> Attachment {
    Attachment::new(text, AttachmentColor::Danger)
}

/// Replaces a prompt after the requester cancels.
#[must_use]
pub fn build_cancelled() -> Message {
    Message::default().with_attachment(success("Successfully cancelled :white_check_mark:"))
}

/// Ephemeral confirmation sent to the requester once the request is posted.
#[must_use]
pub fn build_awaiting_approval(approvers: &UserGroupId) -> Message {
    Message::default().with_attachment(success(format!(
        "Your request has been successfully sent. It is awaiting approval from <!subteam^{approvers}> :white_check_mark:"
    )))
}

/// Channel notice after a membership was created.
#[must_use]
pub fn build_approved(payload: &ApprovalRequest, approver: &UserId) -> Message {
    Message::default().with_attachment(success(format!(
        "Request of <@{}> has been approved by <@{approver}> and processed successfully.\n<@{}> is joined `{}` group for `{}`.",
        payload.requested_user_id, payload.adding_user_id, payload.group_name, payload.expiration,
    )))
}

/// Channel notice after an approved request failed in the directory.
#[must_use]
pub fn build_approval_failed(payload: &ApprovalRequest, approver: &UserId, reason: &str) -> Message {
    Message::default().with_attachment(warning(format!(
        "Request of <@{}> has been approved by <@{approver}>, but it failed with an error.\n{reason}.",
        payload.requested_user_id,
    )))
}

/// Channel notice after a denial.
#[must_use]
pub fn build_denied(payload: &ApprovalRequest, approver: &UserId) -> Message {
    Message::default().with_attachment(warning(format!(
        "Request of <@{}> is denied by <@{approver}>.\n<@{}> did not join `{}` group.",
        payload.requested_user_id, payload.adding_user_id, payload.group_name,
    )))
}

/// Generic failure for payloads that cannot be trusted.
#[must_use]
pub fn build_invalid_request() -> Message {
    Message::default().with_attachment(warning(
        "This request could not be processed and has been discarded :x:",
    ))
}

/// Ephemeral notice for actors outside the approver group.
#[must_use]
pub fn build_not_authorized(approvers: &UserGroupId) -> Message {
    Message::default().with_attachment(warning(format!(
        "Only members of <!subteam^{approvers}> can allow or deny requests :no_entry:"
    )))
}

/// Ephemeral notice for actions on a request that is gone.
#[must_use]
pub fn build_already_resolved() -> Message {
    Message::default().with_attachment(warning(
        "This request has already been handled or has expired :hourglass:",
    ))
}

/// Ephemeral notice when the nominee has no usable email.
#[must_use]
pub fn build_nominee_without_email(nominee: &UserId) -> Message {
    Message::default().with_attachment(warning(format!(
        "<@{nominee}> has no email address in their profile and cannot be added :warning:"
    )))
}

/// Ephemeral notice when a transition failed for a transient reason.
#[must_use]
pub fn build_failure(reason: &str) -> Message {
    Message::default().with_attachment(warning(format!(
        "Something went wrong: {reason} :x:"
    )))
}

/// Ephemeral usage hint for unrecognized mentions.
#[must_use]
pub fn build_usage_hint() -> Message {
    Message::blocks(vec![Block::Section {
        text: Text::mrkdwn("Usage: `@gatekeeper add member`"),
    }])
    .with_text("Usage: @gatekeeper add member")
}
