//! Approval workflow records.
//!
//! A [`PendingRequest`] is the server-side view of one `add member` workflow.
//! An [`ApprovalRequest`] is the self-contained payload attached to the
//! Allow/Deny buttons once the request is awaiting approval.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::expiration::Expiration;
use super::id::{ChannelId, GroupId, RequestId, UserId};

/// Errors decoding an approval payload.
#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    /// The payload is not valid JSON for an approval request.
    #[error("malformed approval payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The payload was empty.
    #[error("approval payload is empty")]
    Empty,
}

/// Errors applying a workflow transition.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// A required selection was not made.
    #[error("{0} must be selected before submission")]
    MissingSelection(&'static str),
    /// The request is not in a state that accepts this step.
    #[error("cannot {action} a request in state {state}")]
    InvalidState {
        /// The step that was attempted.
        action: &'static str,
        /// The state the request was in.
        state: WorkflowState,
    },
}

/// Lifecycle of a membership request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    SelectingNominee,
    SelectingGroupAndExpiration,
    AwaitingApproval,
    Approved,
    Denied,
    Cancelled,
    Invalid,
}

impl WorkflowState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Denied | Self::Cancelled | Self::Invalid
        )
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::SelectingNominee => "selecting_nominee",
            Self::SelectingGroupAndExpiration => "selecting_group_and_expiration",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user being added to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nominee {
    /// Slack user ID.
    pub user_id: UserId,
    /// Directory member key.
    pub email: Email,
}

/// Payload carried by the approval buttons.
///
/// Field names on the wire are kept stable so that buttons posted before a
/// deploy still decode after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(rename = "addingUserEmail")]
    pub adding_user_email: Email,
    #[serde(rename = "addingUserID")]
    pub adding_user_id: UserId,
    #[serde(rename = "groupID")]
    pub group_id: GroupId,
    #[serde(rename = "groupName")]
    pub group_name: String,
    pub expiration: Expiration,
    #[serde(rename = "requestedUserID")]
    pub requested_user_id: UserId,
}

impl ApprovalRequest {
    /// Encode as the opaque button value.
    #[must_use]
    pub fn encode(&self) -> String {
        // A struct of strings cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a button value.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the value is empty or not a valid payload.
    pub fn decode(value: &str) -> Result<Self, PayloadError> {
        if value.trim().is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(serde_json::from_str(value)?)
    }
}

/// Server-side record of one in-flight workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    pub requester: UserId,
    pub channel: ChannelId,
    pub nominee: Option<Nominee>,
    pub group: Option<(GroupId, String)>,
    pub expiration: Option<Expiration>,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
}

impl PendingRequest {
    /// Start a new workflow for `requester` in `channel`.
    #[must_use]
    pub fn new(requester: UserId, channel: ChannelId) -> Self {
        Self {
            id: RequestId::generate(),
            requester,
            channel,
            nominee: None,
            group: None,
            expiration: None,
            state: WorkflowState::SelectingNominee,
            created_at: Utc::now(),
        }
    }

    /// Record the nominee and move on to group selection.
    ///
    /// Re-submitting a nominee while choosing a group replaces it.
    ///
    /// # Errors
    ///
    /// Fails if the request has already moved past nominee selection.
    pub fn select_nominee(&mut self, nominee: Nominee) -> Result<(), TransitionError> {
        match self.state {
            WorkflowState::SelectingNominee | WorkflowState::SelectingGroupAndExpiration => {
                self.nominee = Some(nominee);
                self.state = WorkflowState::SelectingGroupAndExpiration;
                Ok(())
            }
            state => Err(TransitionError::InvalidState {
                action: "select a nominee for",
                state,
            }),
        }
    }

    /// Record group and expiration and move to `AwaitingApproval`.
    ///
    /// Both selections are required; when either is missing the request is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// [`TransitionError::MissingSelection`] for a missing field, or
    /// [`TransitionError::InvalidState`] outside group selection.
    pub fn submit_for_approval(
        &mut self,
        group: Option<(GroupId, String)>,
        expiration: Option<Expiration>,
    ) -> Result<ApprovalRequest, TransitionError> {
        if self.state != WorkflowState::SelectingGroupAndExpiration {
            return Err(TransitionError::InvalidState {
                action: "submit",
                state: self.state,
            });
        }
        let nominee = self.nominee.clone().ok_or(TransitionError::InvalidState {
            action: "submit",
            state: self.state,
        })?;
        let (group_id, group_name) = group
            .filter(|(id, _)| !id.is_empty())
            .ok_or(TransitionError::MissingSelection("group"))?;
        let expiration = expiration.ok_or(TransitionError::MissingSelection("expiration"))?;

        self.group = Some((group_id.clone(), group_name.clone()));
        self.expiration = Some(expiration);
        self.state = WorkflowState::AwaitingApproval;

        Ok(ApprovalRequest {
            request_id: self.id,
            adding_user_email: nominee.email,
            adding_user_id: nominee.user_id,
            group_id,
            group_name,
            expiration,
            requested_user_id: self.requester.clone(),
        })
    }

    /// Mark an awaiting request as approved.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidState`] unless the request is awaiting approval.
    pub fn approve(&mut self) -> Result<(), TransitionError> {
        self.decide("approve", WorkflowState::Approved)
    }

    /// Mark an awaiting request as denied.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidState`] unless the request is awaiting approval.
    pub fn deny(&mut self) -> Result<(), TransitionError> {
        self.decide("deny", WorkflowState::Denied)
    }

    /// Cancel the request from any non-terminal state.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidState`] if the request has already ended.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.end("cancel", WorkflowState::Cancelled)
    }

    /// Discard the request after a payload that does not match it.
    ///
    /// # Errors
    ///
    /// [`TransitionError::InvalidState`] if the request has already ended.
    pub fn invalidate(&mut self) -> Result<(), TransitionError> {
        self.end("invalidate", WorkflowState::Invalid)
    }

    fn decide(&mut self, action: &'static str, to: WorkflowState) -> Result<(), TransitionError> {
        if self.state != WorkflowState::AwaitingApproval {
            return Err(TransitionError::InvalidState {
                action,
                state: self.state,
            });
        }
        self.state = to;
        Ok(())
    }

    fn end(&mut self, action: &'static str, to: WorkflowState) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::InvalidState {
                action,
                state: self.state,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Whether a decoded payload describes exactly this request.
    #[must_use]
    pub fn matches(&self, payload: &ApprovalRequest) -> bool {
        self.state == WorkflowState::AwaitingApproval
            && self.id == payload.request_id
            && self.requester == payload.requested_user_id
            && self.expiration == Some(payload.expiration)
            && self
                .group
                .as_ref()
                .is_some_and(|(id, name)| id == &payload.group_id && name == &payload.group_name)
            && self.nominee.as_ref().is_some_and(|n| {
                n.user_id == payload.adding_user_id && n.email == payload.adding_user_email
            })
    }
}
