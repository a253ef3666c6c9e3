//! Membership request workflow.
//!
//! This service drives one request from `add member` to a terminal state:
//! 1. The requester picks a nominee in an ephemeral prompt
//! 2. The requester picks an eligible group and an expiration
//! 3. The approver user group is asked to Allow or Deny
//! 4. Allow creates the membership and records the grant for revocation
//!
//! Approve and deny *claim* the request from the [`RequestTable`] before
//! doing anything else, so a request is decided at most once.

use std::sync::Arc;

use gatekeeper_core::{
    ApprovalRequest, ChannelId, Email, Expiration, GrantRecord, GroupId, Membership,
    MembershipRole, Nominee, OperationName, PayloadError, PendingRequest, RequestId,
    TransitionError, UserGroupId, UserId, WorkflowState,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::grant_store::GrantStore;
use super::request_table::RequestTable;
use super::snapshot_cache::SnapshotCache;
use crate::directory::{Directory, DirectoryError, MembershipResource, OperationPoller};
use crate::slack::{ChatTransport, Message, ResponseAction, SlackError, messages};

/// Errors produced by workflow transitions.
///
/// By the time one of these is returned the involved users have already
/// been told; callers only need to log it.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A required selection was missing or a step was out of order.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The approval payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] PayloadError),

    /// The payload decoded but does not describe the pending request.
    #[error("Approval payload does not match request {0}")]
    Mismatch(RequestId),

    /// The identity directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Slack failed.
    #[error(transparent)]
    Transport(#[from] SlackError),

    /// The actor is not allowed to take this action.
    #[error("User {0} is not authorized")]
    NotAuthorized(UserId),

    /// The request was already approved, denied or cancelled.
    #[error("Request has already been resolved")]
    AlreadyResolved,

    /// The request is unknown, most likely because its TTL elapsed.
    #[error("Request has expired")]
    Expired,
}

impl WorkflowError {
    /// Whether this is an expected user mistake rather than a failure.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotAuthorized(_) | Self::AlreadyResolved | Self::Expired
        )
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(e: TransitionError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Where an interaction came from and who triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// User who clicked.
    pub actor: UserId,
    /// Channel of the source message.
    pub channel: ChannelId,
    /// URL for replacing or deleting the source message.
    pub response_url: String,
}

/// An approval that has been claimed and still needs the directory call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedApproval {
    pub payload: ApprovalRequest,
    pub approver: UserId,
    pub channel: ChannelId,
}

/// A membership created for an approved request and its expiry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub record: GrantRecord,
    pub membership: Membership,
}

/// Collaborators of [`WorkflowService`].
pub struct WorkflowDeps {
    pub chat: Arc<dyn ChatTransport>,
    pub directory: Arc<dyn Directory>,
    pub requests: RequestTable,
    pub snapshots: SnapshotCache,
    pub grants: GrantStore,
    pub poller: OperationPoller,
    pub approvers: UserGroupId,
}

/// Drives membership requests through their states.
#[derive(Clone)]
pub struct WorkflowService {
    chat: Arc<dyn ChatTransport>,
    directory: Arc<dyn Directory>,
    requests: RequestTable,
    snapshots: SnapshotCache,
    grants: GrantStore,
    poller: OperationPoller,
    approvers: UserGroupId,
}

impl std::fmt::Debug for WorkflowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowService")
            .field("approvers", &self.approvers)
            .field("grants", &self.grants)
            .finish_non_exhaustive()
    }
}

impl WorkflowService {
    /// Create a workflow service.
    #[must_use]
    pub fn new(deps: WorkflowDeps) -> Self {
        Self {
            chat: deps.chat,
            directory: deps.directory,
            requests: deps.requests,
            snapshots: deps.snapshots,
            grants: deps.grants,
            poller: deps.poller,
            approvers: deps.approvers,
        }
    }

    /// The grant expiry store.
    #[must_use]
    pub const fn grants(&self) -> &GrantStore {
        &self.grants
    }

    /// The in-flight request table.
    #[must_use]
    pub const fn requests(&self) -> &RequestTable {
        &self.requests
    }

    // =========================================================================
    // Requester steps
    // =========================================================================

    /// Start a request and show the nominee prompt to the requester.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Transport`] if the prompt cannot be posted.
    #[instrument(skip(self), fields(requester = %requester, channel = %channel))]
    pub async fn start(
        &self,
        requester: UserId,
        channel: ChannelId,
    ) -> Result<RequestId, WorkflowError> {
        let request = PendingRequest::new(requester.clone(), channel.clone());
        let id = request.id;
        self.requests.put(request).await;

        self.chat
            .post_ephemeral(
                &channel,
                &requester,
                messages::build_nominee_prompt(id, &requester),
            )
            .await?;

        info!(request_id = %id, "Membership request started");
        Ok(id)
    }

    /// Tell a user how to start a request.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Transport`] if the hint cannot be posted.
    pub async fn send_usage_hint(
        &self,
        user: &UserId,
        channel: &ChannelId,
    ) -> Result<(), WorkflowError> {
        self.chat
            .post_ephemeral(channel, user, messages::build_usage_hint())
            .await?;
        Ok(())
    }

    /// Record the nominee and show the group and expiration prompt.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] when no user was selected or the user
    /// has no email, [`WorkflowError::Expired`] for unknown requests.
    #[instrument(skip(self, interaction), fields(actor = %interaction.actor))]
    pub async fn submit_nominee(
        &self,
        request_id: &str,
        interaction: &Interaction,
        selected_user: Option<UserId>,
    ) -> Result<(), WorkflowError> {
        let mut request = self.load(request_id, interaction).await?;

        let Some(user) = selected_user.filter(|u| !u.is_empty()) else {
            self.respond(
                interaction,
                ResponseAction::Replace(messages::build_nominee_prompt_invalid(
                    request.id,
                    &request.requester,
                )),
            )
            .await?;
            return Err(WorkflowError::Validation("nominee must be selected".into()));
        };

        let Some(email) = self.chat.user_email(&user).await? else {
            self.respond(
                interaction,
                ResponseAction::Ephemeral(messages::build_nominee_without_email(&user)),
            )
            .await?;
            return Err(WorkflowError::Validation(format!(
                "user {user} has no email address"
            )));
        };

        request.select_nominee(Nominee {
            user_id: user.clone(),
            email: email.clone(),
        })?;
        let id = request.id;
        self.requests.put(request).await;

        let groups = self.snapshots.eligible_groups(&email);
        debug!(request_id = %id, eligible = groups.len(), "Nominee selected");

        self.respond(
            interaction,
            ResponseAction::Replace(messages::build_group_prompt(id, &user, &groups, None, None)),
        )
        .await
    }

    /// Record group and expiration and post the approval request.
    ///
    /// The request only moves to awaiting approval once the approval message
    /// is posted, so a failed post can simply be submitted again.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] when either selection is missing or the
    /// group is not offered to the nominee; the prompt is re-rendered.
    /// [`WorkflowError::AlreadyResolved`] when the request was already
    /// submitted, [`WorkflowError::Transport`] when the post fails.
    #[instrument(skip(self, interaction, group), fields(actor = %interaction.actor))]
    pub async fn submit_group_and_expiration(
        &self,
        request_id: &str,
        interaction: &Interaction,
        group: Option<(GroupId, String)>,
        expiration: Option<Expiration>,
    ) -> Result<(), WorkflowError> {
        let mut request = self.load(request_id, interaction).await?;

        let group = match self.offered_group(&request, group) {
            Ok(group) => group,
            Err(unavailable) => {
                self.reprompt_group(&request, interaction, None, expiration)
                    .await?;
                return Err(WorkflowError::Validation(format!(
                    "group {unavailable} is not available for this nominee"
                )));
            }
        };

        let payload = match request.submit_for_approval(group.clone(), expiration) {
            Ok(payload) => payload,
            Err(e @ TransitionError::MissingSelection(_)) => {
                self.reprompt_group(&request, interaction, group.as_ref(), expiration)
                    .await?;
                return Err(e.into());
            }
            Err(TransitionError::InvalidState {
                state: WorkflowState::AwaitingApproval,
                ..
            }) => return self.already_resolved(interaction).await,
            Err(e) => {
                self.respond(
                    interaction,
                    ResponseAction::Ephemeral(messages::build_failure(&e.to_string())),
                )
                .await?;
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .chat
            .post_message(
                &interaction.channel,
                messages::build_approval_request(&payload, &self.approvers),
            )
            .await
        {
            error!(request_id = %payload.request_id, error = %e, "Failed to post approval request");
            self.respond_or_log(
                interaction,
                ResponseAction::Ephemeral(messages::build_failure(
                    "the approval request could not be posted, please submit again",
                )),
            )
            .await;
            return Err(e.into());
        }
        self.requests.put(request).await;

        self.respond(
            interaction,
            ResponseAction::Replace(messages::build_awaiting_approval(&self.approvers)),
        )
        .await?;

        info!(
            request_id = %payload.request_id,
            group = %payload.group_id,
            expiration = %payload.expiration,
            "Request awaiting approval"
        );
        Ok(())
    }

    /// Cancel a request in any non-terminal state. Only the requester may.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::NotAuthorized`] for anyone but the requester,
    /// [`WorkflowError::AlreadyResolved`] if the request is gone.
    #[instrument(skip(self, interaction), fields(actor = %interaction.actor))]
    pub async fn cancel(&self, request_id: &str, interaction: &Interaction) -> Result<(), WorkflowError> {
        let request = self.load(request_id, interaction).await?;

        if request.requester != interaction.actor {
            self.respond(
                interaction,
                ResponseAction::Ephemeral(messages::build_failure(
                    "only the requester can cancel this request",
                )),
            )
            .await?;
            return Err(WorkflowError::NotAuthorized(interaction.actor.clone()));
        }

        let Some(mut request) = self.requests.claim(&request.id).await else {
            return self.already_resolved(interaction).await;
        };
        request.cancel()?;

        self.respond(
            interaction,
            ResponseAction::Replace(messages::build_cancelled()),
        )
        .await?;

        info!(request_id = %request.id, state = %request.state, "Request cancelled");
        Ok(())
    }

    // =========================================================================
    // Approver steps
    // =========================================================================

    /// Authorize the approver, claim the request and delete the approval
    /// message.
    ///
    /// The directory round-trip is left to [`Self::complete_approval`] so the
    /// caller can run it off the dispatch loop.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::NotAuthorized`], [`WorkflowError::Decode`],
    /// [`WorkflowError::Mismatch`] or [`WorkflowError::AlreadyResolved`].
    /// Only a mismatch consumes the request, which is then marked invalid.
    #[instrument(skip(self, value, interaction), fields(actor = %interaction.actor))]
    pub async fn approve(
        &self,
        value: &str,
        interaction: &Interaction,
    ) -> Result<ClaimedApproval, WorkflowError> {
        let payload = self
            .claim_decision(value, interaction, PendingRequest::approve)
            .await?;

        info!(
            request_id = %payload.request_id,
            approver = %interaction.actor,
            "Request approved"
        );
        Ok(ClaimedApproval {
            payload,
            approver: interaction.actor.clone(),
            channel: interaction.channel.clone(),
        })
    }

    /// Create the membership for a claimed approval and record the grant.
    ///
    /// The grant is recorded even if the closing notice cannot be posted.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Directory`] if creation fails; a failure notice has
    /// been posted and no grant is recorded.
    #[instrument(skip(self, claim), fields(request_id = %claim.payload.request_id, group = %claim.payload.group_id))]
    pub async fn complete_approval(
        &self,
        claim: ClaimedApproval,
    ) -> Result<Grant, WorkflowError> {
        let ClaimedApproval {
            payload,
            approver,
            channel,
        } = claim;

        let membership = match self.create_membership(&payload.group_id, &payload.adding_user_email).await {
            Ok(membership) => membership,
            Err(e) => {
                error!(error = %e, "Failed to create membership");
                self.notify(
                    &channel,
                    messages::build_approval_failed(&payload, &approver, &e.user_message()),
                )
                .await;
                return Err(e.into());
            }
        };

        let record = self
            .grants
            .insert(membership.id.clone(), payload.expiration);
        info!(
            membership = %membership.id,
            operation = membership.created_by.as_ref().map_or("", OperationName::as_str),
            expires_at = %record.expires_at(),
            "Grant recorded"
        );
        self.notify(&channel, messages::build_approved(&payload, &approver))
            .await;

        Ok(Grant { record, membership })
    }

    /// Deny a request.
    ///
    /// # Errors
    ///
    /// As [`Self::approve`].
    #[instrument(skip(self, value, interaction), fields(actor = %interaction.actor))]
    pub async fn deny(&self, value: &str, interaction: &Interaction) -> Result<(), WorkflowError> {
        let payload = self
            .claim_decision(value, interaction, PendingRequest::deny)
            .await?;

        self.notify(
            &interaction.channel,
            messages::build_denied(&payload, &interaction.actor),
        )
        .await;

        info!(
            request_id = %payload.request_id,
            approver = %interaction.actor,
            "Request denied"
        );
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn create_membership(
        &self,
        group: &GroupId,
        member: &Email,
    ) -> Result<Membership, DirectoryError> {
        let operation = self
            .directory
            .create_membership(group, member, &[MembershipRole::member()])
            .await?;
        let created_by =
            (!operation.name.is_empty()).then(|| OperationName::new(operation.name.clone()));
        let resource: MembershipResource = self
            .poller
            .wait_for(self.directory.as_ref(), operation)
            .await?;
        Ok(Membership {
            created_by,
            ..Membership::from(resource)
        })
    }

    /// The submitted group, named as in the current snapshot.
    ///
    /// Fails with the group id when the snapshot has no such group or the
    /// nominee already belongs to it.
    fn offered_group(
        &self,
        request: &PendingRequest,
        group: Option<(GroupId, String)>,
    ) -> Result<Option<(GroupId, String)>, GroupId> {
        let Some(nominee) = &request.nominee else {
            return Ok(group);
        };
        let Some((id, name)) = group else {
            return Ok(None);
        };
        if id.is_empty() {
            return Ok(Some((id, name)));
        }
        match self.snapshots.group(&id) {
            Some(found) if !found.has_member(&nominee.email) => {
                Ok(Some((id, found.display_name)))
            }
            _ => Err(id),
        }
    }

    async fn reprompt_group(
        &self,
        request: &PendingRequest,
        interaction: &Interaction,
        group: Option<&(GroupId, String)>,
        expiration: Option<Expiration>,
    ) -> Result<(), WorkflowError> {
        let Some(nominee) = &request.nominee else {
            return Ok(());
        };
        let groups = self.snapshots.eligible_groups(&nominee.email);
        self.respond(
            interaction,
            ResponseAction::Replace(messages::build_group_prompt_invalid(
                request.id,
                &nominee.user_id,
                &groups,
                group,
                expiration,
            )),
        )
        .await
    }

    /// Shared first half of approve and deny.
    ///
    /// Once the request is claimed the decision stands: Slack failures after
    /// that point are logged, not returned.
    async fn claim_decision(
        &self,
        value: &str,
        interaction: &Interaction,
        decide: fn(&mut PendingRequest) -> Result<(), TransitionError>,
    ) -> Result<ApprovalRequest, WorkflowError> {
        self.authorize(interaction).await?;

        let payload = match ApprovalRequest::decode(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable approval payload");
                self.respond(interaction, ResponseAction::Delete).await?;
                self.respond(
                    interaction,
                    ResponseAction::Ephemeral(messages::build_invalid_request()),
                )
                .await?;
                return Err(e.into());
            }
        };

        let Some(mut request) = self.requests.claim(&payload.request_id).await else {
            return self.already_resolved(interaction).await;
        };

        self.respond_or_log(interaction, ResponseAction::Delete).await;

        if !request.matches(&payload) {
            request.invalidate()?;
            warn!(
                request_id = %request.id,
                state = %request.state,
                "Approval payload does not match pending request"
            );
            self.respond_or_log(
                interaction,
                ResponseAction::Ephemeral(messages::build_invalid_request()),
            )
            .await;
            return Err(WorkflowError::Mismatch(request.id));
        }

        decide(&mut request)?;
        debug!(request_id = %request.id, state = %request.state, "Request claimed");
        Ok(payload)
    }

    async fn authorize(&self, interaction: &Interaction) -> Result<(), WorkflowError> {
        let members = self.chat.usergroup_members(&self.approvers).await?;
        if members.contains(&interaction.actor) {
            return Ok(());
        }

        self.respond(
            interaction,
            ResponseAction::Ephemeral(messages::build_not_authorized(&self.approvers)),
        )
        .await?;
        Err(WorkflowError::NotAuthorized(interaction.actor.clone()))
    }

    async fn load(
        &self,
        request_id: &str,
        interaction: &Interaction,
    ) -> Result<PendingRequest, WorkflowError> {
        let request = match RequestId::parse(request_id) {
            Ok(id) => self.requests.get(&id).await,
            Err(_) => None,
        };

        match request {
            Some(request) => Ok(request),
            None => {
                self.respond(
                    interaction,
                    ResponseAction::Ephemeral(messages::build_already_resolved()),
                )
                .await?;
                Err(WorkflowError::Expired)
            }
        }
    }

    async fn already_resolved<T>(&self, interaction: &Interaction) -> Result<T, WorkflowError> {
        self.respond(
            interaction,
            ResponseAction::Ephemeral(messages::build_already_resolved()),
        )
        .await?;
        Err(WorkflowError::AlreadyResolved)
    }

    async fn respond(
        &self,
        interaction: &Interaction,
        action: ResponseAction,
    ) -> Result<(), WorkflowError> {
        Ok(self.chat.respond(&interaction.response_url, action).await?)
    }

    async fn respond_or_log(&self, interaction: &Interaction, action: ResponseAction) {
        if let Err(e) = self.chat.respond(&interaction.response_url, action).await {
            warn!(error = %e, "Failed to update interaction message");
        }
    }

    /// Post a channel notice, logging rather than propagating failures.
    async fn notify(&self, channel: &ChannelId, message: Message) {
        if let Err(e) = self.chat.post_message(channel, message).await {
            error!(channel = %channel, error = %e, "Failed to post notice");
        }
    }
}
