//! Integration tests for Gatekeeper.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p gatekeeper-integration-tests
//! ```
//!
//! No Slack workspace or Google credentials are needed: the workflow runs
//! against [`FakeDirectory`] and [`RecordingTransport`], and timers run on
//! Tokio's paused clock.
//!
//! # Test Categories
//!
//! - `workflow_scenarios` - End-to-end request flows (eligibility, deny,
//!   approve with expiry, creation failure)
//! - `approval_guards` - Duplicate and unauthorized decisions
//! - `snapshot_refresh` - Directory snapshot replacement
//! - `slack_routes` - Signed HTTP callbacks into the event queue
//! - `transport_failures` - Slack calls failing partway through a request

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_bot::directory::{
    Directory, DirectoryError, GroupResource, Operation, OperationPoller, OperationStatus,
};
use gatekeeper_bot::services::{
    GrantStore, Interaction, RequestTable, SnapshotCache, WorkflowDeps, WorkflowService,
    spawn_revocation_workers,
};
use gatekeeper_bot::slack::messages::action;
use gatekeeper_bot::slack::{
    ActionElement, Block, ChatTransport, Message, ResponseAction, SlackError,
};
use gatekeeper_core::{
    ApprovalRequest, ChannelId, Email, Expiration, GroupId, Membership, MembershipId,
    MembershipRole, OperationName, UserGroupId, UserId,
};
use tokio::task::JoinHandle;

/// Customer used by every harness.
pub const CUSTOMER_ID: &str = "C0test";
/// Approver user group used by every harness.
pub const APPROVERS: &str = "S0APPROVERS";
/// Channel requests are made in.
pub const CHANNEL: &str = "C0REQUESTS";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Fake directory
// =============================================================================

#[derive(Default)]
struct DirectoryState {
    groups: Vec<(GroupId, String, Vec<Membership>)>,
    operations: HashMap<String, Operation>,
    created: Vec<(GroupId, Email)>,
    deleted: Vec<MembershipId>,
    create_failure: Option<String>,
    list_failure: Option<String>,
    next_id: u64,
}

/// In-memory Cloud Identity.
///
/// Creations return a pending operation that completes on the first poll;
/// deletions complete inline.
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<DirectoryState>,
}

impl FakeDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group whose members are the given emails.
    #[must_use]
    pub fn with_group(self, id: &str, name: &str, members: &[&str]) -> Self {
        {
            let mut state = lock(&self.state);
            let memberships = members
                .iter()
                .enumerate()
                .map(|(i, email)| Membership {
                    id: MembershipId::new(format!("{id}/memberships/seed-{i}")),
                    member_key: (*email).to_string(),
                    roles: vec![MembershipRole::member()],
                    created_by: None,
                })
                .collect();
            state
                .groups
                .push((GroupId::new(id), name.to_string(), memberships));
        }
        self
    }

    /// Make every later creation fail with `message`.
    pub fn fail_creates(&self, message: &str) {
        lock(&self.state).create_failure = Some(message.to_string());
    }

    /// Make listing fail (or succeed again with `None`).
    pub fn fail_listing(&self, message: Option<&str>) {
        lock(&self.state).list_failure = message.map(str::to_string);
    }

    /// Remove a group from later listings.
    pub fn remove_group(&self, id: &str) {
        lock(&self.state).groups.retain(|(g, _, _)| g.as_str() != id);
    }

    /// Every `create_membership` call, in order.
    #[must_use]
    pub fn created(&self) -> Vec<(GroupId, Email)> {
        lock(&self.state).created.clone()
    }

    /// Every `delete_membership` call, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<MembershipId> {
        lock(&self.state).deleted.clone()
    }

    /// Whether `email` currently holds a membership in `group`.
    #[must_use]
    pub fn is_member(&self, group: &str, email: &str) -> bool {
        let email = Email::parse(email).expect("valid email");
        lock(&self.state)
            .groups
            .iter()
            .filter(|(g, _, _)| g.as_str() == group)
            .flat_map(|(_, _, members)| members)
            .any(|m| email.matches_member_key(&m.member_key))
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn list_groups(&self, _parent: &str) -> Result<Vec<GroupResource>, DirectoryError> {
        let state = lock(&self.state);
        if let Some(message) = &state.list_failure {
            return Err(DirectoryError::Api {
                status: 503,
                message: message.clone(),
            });
        }
        Ok(state
            .groups
            .iter()
            .map(|(id, name, _)| GroupResource {
                name: id.clone(),
                display_name: Some(name.clone()),
            })
            .collect())
    }

    async fn list_memberships(&self, group: &GroupId) -> Result<Vec<Membership>, DirectoryError> {
        let state = lock(&self.state);
        if let Some(message) = &state.list_failure {
            return Err(DirectoryError::Api {
                status: 503,
                message: message.clone(),
            });
        }
        Ok(state
            .groups
            .iter()
            .find(|(id, _, _)| id == group)
            .map(|(_, _, members)| members.clone())
            .unwrap_or_default())
    }

    async fn create_membership(
        &self,
        group: &GroupId,
        member: &Email,
        roles: &[MembershipRole],
    ) -> Result<Operation, DirectoryError> {
        let mut state = lock(&self.state);
        state.created.push((group.clone(), member.clone()));
        state.next_id += 1;
        let name = format!("operations/create-{}", state.next_id);

        let completed = if let Some(message) = state.create_failure.clone() {
            Operation {
                name: name.clone(),
                done: true,
                response: None,
                error: Some(OperationStatus { code: 9, message }),
            }
        } else {
            let id = MembershipId::new(format!("{group}/memberships/m{}", state.next_id));
            if let Some((_, _, members)) = state.groups.iter_mut().find(|(g, _, _)| g == group) {
                members.push(Membership {
                    id: id.clone(),
                    member_key: member.to_string(),
                    roles: roles.to_vec(),
                    created_by: Some(OperationName::new(name.clone())),
                });
            }
            Operation {
                name: name.clone(),
                done: true,
                response: Some(serde_json::json!({
                    "name": id,
                    "preferredMemberKey": { "id": member.as_str() },
                    "roles": [{ "name": "MEMBER" }],
                })),
                error: None,
            }
        };
        state.operations.insert(name.clone(), completed);

        Ok(Operation {
            name,
            ..Operation::default()
        })
    }

    async fn delete_membership(
        &self,
        membership: &MembershipId,
    ) -> Result<Operation, DirectoryError> {
        let mut state = lock(&self.state);
        state.deleted.push(membership.clone());
        for (_, _, members) in &mut state.groups {
            members.retain(|m| &m.id != membership);
        }
        Ok(Operation {
            done: true,
            ..Operation::default()
        })
    }

    async fn get_operation(&self, name: &OperationName) -> Result<Operation, DirectoryError> {
        lock(&self.state)
            .operations
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| DirectoryError::Api {
                status: 404,
                message: format!("Operation {name} not found"),
            })
    }
}

// =============================================================================
// Recording chat transport
// =============================================================================

/// One outbound Slack call.
#[derive(Debug, Clone)]
pub enum Sent {
    Post {
        channel: ChannelId,
        message: Message,
    },
    Ephemeral {
        channel: ChannelId,
        user: UserId,
        message: Message,
    },
    Respond {
        response_url: String,
        action: ResponseAction,
    },
}

impl Sent {
    /// The call's message content as JSON, or `"delete"`.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Post { message, .. }
            | Self::Ephemeral { message, .. }
            | Self::Respond {
                action: ResponseAction::Replace(message) | ResponseAction::Ephemeral(message),
                ..
            } => serde_json::to_string(message).expect("message serializes"),
            Self::Respond {
                action: ResponseAction::Delete,
                ..
            } => "delete".to_string(),
        }
    }
}

/// Slack stand-in that records every call.
#[derive(Default)]
pub struct RecordingTransport {
    emails: Mutex<HashMap<UserId, Email>>,
    approvers: Mutex<Vec<UserId>>,
    sent: Mutex<Vec<Sent>>,
    failing_posts: Mutex<usize>,
    failing_responds: Mutex<usize>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give a user a profile email.
    #[must_use]
    pub fn with_email(self, user: &str, email: &str) -> Self {
        lock(&self.emails).insert(
            UserId::new(user),
            Email::parse(email).expect("valid email"),
        );
        self
    }

    /// Add a user to the approver user group.
    #[must_use]
    pub fn with_approver(self, user: &str) -> Self {
        lock(&self.approvers).push(UserId::new(user));
        self
    }

    /// Make the next `count` channel posts fail. Failed calls are not recorded.
    pub fn fail_next_posts(&self, count: usize) {
        *lock(&self.failing_posts) = count;
    }

    /// Make the next `count` response URL calls fail. Failed calls are not
    /// recorded.
    pub fn fail_next_responds(&self, count: usize) {
        *lock(&self.failing_responds) = count;
    }

    /// Every call so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.sent).clone()
    }

    /// Channel messages so far.
    #[must_use]
    pub fn posts(&self) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Post { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Whether any call rendered text containing `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.sent().iter().any(|s| s.render().contains(needle))
    }

    /// Number of calls rendering text containing `needle`.
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        self.sent()
            .iter()
            .filter(|s| s.render().contains(needle))
            .count()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        lock(&self.sent).clear();
    }

    /// Encoded payload carried by the most recent approval request.
    #[must_use]
    pub fn last_approval_value(&self) -> Option<String> {
        self.posts().iter().rev().find_map(approval_value)
    }

    fn record(&self, sent: Sent) {
        lock(&self.sent).push(sent);
    }

    fn take_failure(counter: &Mutex<usize>) -> Result<(), SlackError> {
        let mut remaining = lock(counter);
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;
        Err(SlackError::Api("ratelimited".to_string()))
    }
}

/// The Allow button's value in an approval request message.
#[must_use]
pub fn approval_value(message: &Message) -> Option<String> {
    message.blocks.iter().find_map(|block| match block {
        Block::Actions { elements, .. } => elements.iter().find_map(|element| match element {
            ActionElement::Button {
                action_id, value, ..
            } if action_id == action::ALLOW_ADDING_USER => value.clone(),
            _ => None,
        }),
        _ => None,
    })
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn post_message(&self, channel: &ChannelId, message: Message) -> Result<(), SlackError> {
        Self::take_failure(&self.failing_posts)?;
        self.record(Sent::Post {
            channel: channel.clone(),
            message,
        });
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        message: Message,
    ) -> Result<(), SlackError> {
        self.record(Sent::Ephemeral {
            channel: channel.clone(),
            user: user.clone(),
            message,
        });
        Ok(())
    }

    async fn respond(&self, response_url: &str, action: ResponseAction) -> Result<(), SlackError> {
        Self::take_failure(&self.failing_responds)?;
        self.record(Sent::Respond {
            response_url: response_url.to_string(),
            action,
        });
        Ok(())
    }

    async fn user_email(&self, user: &UserId) -> Result<Option<Email>, SlackError> {
        Ok(lock(&self.emails).get(user).cloned())
    }

    async fn usergroup_members(&self, _group: &UserGroupId) -> Result<Vec<UserId>, SlackError> {
        Ok(lock(&self.approvers).clone())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A workflow wired to fakes, with revocation workers running.
pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub chat: Arc<RecordingTransport>,
    pub snapshots: SnapshotCache,
    pub grants: GrantStore,
    pub workflow: WorkflowService,
    pub workers: Vec<JoinHandle<()>>,
}

impl Harness {
    /// Build the harness and load the first snapshot.
    pub async fn new(directory: FakeDirectory, chat: RecordingTransport) -> Self {
        let directory = Arc::new(directory);
        let chat = Arc::new(chat);
        let poller = OperationPoller::default();

        let snapshots = SnapshotCache::new();
        snapshots
            .refresh_once(directory.as_ref(), CUSTOMER_ID)
            .await
            .expect("initial snapshot");

        let (grants, jobs) = GrantStore::new();
        let workers = spawn_revocation_workers(2, jobs, directory.clone(), poller);

        let workflow = WorkflowService::new(WorkflowDeps {
            chat: chat.clone(),
            directory: directory.clone(),
            requests: RequestTable::new(Duration::from_secs(24 * 3600)),
            snapshots: snapshots.clone(),
            grants: grants.clone(),
            poller,
            approvers: UserGroupId::new(APPROVERS),
        });

        Self {
            directory,
            chat,
            snapshots,
            grants,
            workflow,
            workers,
        }
    }

    /// Drive a request up to the approval message and return its button value.
    pub async fn request_approval(
        &self,
        requester: &str,
        nominee: &str,
        group: (&str, &str),
        expiration: Expiration,
    ) -> String {
        let id = self
            .workflow
            .start(UserId::new(requester), ChannelId::new(CHANNEL))
            .await
            .expect("start");
        let from_requester = interaction(requester);

        self.workflow
            .submit_nominee(&id.to_string(), &from_requester, Some(UserId::new(nominee)))
            .await
            .expect("nominee");
        self.workflow
            .submit_group_and_expiration(
                &id.to_string(),
                &from_requester,
                Some((GroupId::new(group.0), group.1.to_string())),
                Some(expiration),
            )
            .await
            .expect("group and expiration");

        self.chat
            .last_approval_value()
            .expect("approval request posted")
    }
}

/// An interaction by `actor` in the request channel.
#[must_use]
pub fn interaction(actor: &str) -> Interaction {
    Interaction {
        actor: UserId::new(actor),
        channel: ChannelId::new(CHANNEL),
        response_url: format!("https://hooks.slack.com/actions/{actor}"),
    }
}

/// Decode an approval button value.
#[must_use]
pub fn decode(value: &str) -> ApprovalRequest {
    ApprovalRequest::decode(value).expect("valid approval payload")
}
