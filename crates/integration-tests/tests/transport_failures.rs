//! Slack calls failing partway through a request.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatekeeper_bot::services::WorkflowError;
use gatekeeper_core::{ChannelId, Expiration, GroupId, RequestId, UserId, WorkflowState};
use gatekeeper_integration_tests::{
    CHANNEL, FakeDirectory, Harness, RecordingTransport, interaction,
};

const REQUESTER: &str = "U0REQUESTER";
const NOMINEE: &str = "U0ALICE";
const APPROVER: &str = "U0APPROVER";

async fn harness() -> Harness {
    Harness::new(
        FakeDirectory::new().with_group("groups/ops", "Operations", &[]),
        RecordingTransport::new()
            .with_email(NOMINEE, "alice@example.com")
            .with_approver(APPROVER),
    )
    .await
}

async fn at_group_step(harness: &Harness) -> RequestId {
    let id = harness
        .workflow
        .start(UserId::new(REQUESTER), ChannelId::new(CHANNEL))
        .await
        .unwrap();
    harness
        .workflow
        .submit_nominee(&id.to_string(), &interaction(REQUESTER), Some(UserId::new(NOMINEE)))
        .await
        .unwrap();
    id
}

async fn submit(harness: &Harness, id: RequestId) -> Result<(), WorkflowError> {
    harness
        .workflow
        .submit_group_and_expiration(
            &id.to_string(),
            &interaction(REQUESTER),
            Some((GroupId::new("groups/ops"), "Operations".into())),
            Some(Expiration::OneHour),
        )
        .await
}

// =============================================================================
// Approval request post
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_approval_post_can_be_resubmitted() {
    let harness = harness().await;
    let id = at_group_step(&harness).await;

    harness.chat.fail_next_posts(1);
    let err = submit(&harness, id).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Transport(_)));
    assert!(harness.chat.last_approval_value().is_none());
    assert!(harness.chat.contains("could not be posted"));
    let pending = harness.workflow.requests().get(&id).await.unwrap();
    assert_eq!(pending.state, WorkflowState::SelectingGroupAndExpiration);

    submit(&harness, id).await.unwrap();
    let value = harness.chat.last_approval_value().expect("posted on retry");

    let claim = harness
        .workflow
        .approve(&value, &interaction(APPROVER))
        .await
        .unwrap();
    harness.workflow.complete_approval(claim).await.unwrap();
    assert_eq!(harness.directory.created().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_submit_is_told_request_is_handled() {
    let harness = harness().await;
    let id = at_group_step(&harness).await;
    submit(&harness, id).await.unwrap();

    let err = submit(&harness, id).await.unwrap_err();

    assert!(matches!(err, WorkflowError::AlreadyResolved));
    assert!(harness.chat.contains("already been handled"));
    assert_eq!(harness.chat.posts().len(), 1, "one approval request");
}

// =============================================================================
// After the claim
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_message_delete_does_not_drop_approval() {
    let harness = harness().await;
    let value = harness
        .request_approval(REQUESTER, NOMINEE, ("groups/ops", "Operations"), Expiration::OneHour)
        .await;

    harness.chat.fail_next_responds(1);
    let claim = harness
        .workflow
        .approve(&value, &interaction(APPROVER))
        .await
        .unwrap();
    assert!(!harness.chat.sent().iter().any(|s| s.render() == "delete"));

    let grant = harness.workflow.complete_approval(claim).await.unwrap();
    assert!(harness.grants.contains(&grant.record.membership_id));
    assert!(harness.directory.is_member("groups/ops", "alice@example.com"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_message_delete_does_not_drop_denial() {
    let harness = harness().await;
    let value = harness
        .request_approval(REQUESTER, NOMINEE, ("groups/ops", "Operations"), Expiration::OneHour)
        .await;

    harness.chat.fail_next_responds(1);
    harness
        .workflow
        .deny(&value, &interaction(APPROVER))
        .await
        .unwrap();

    assert!(harness.chat.contains("is denied by"));
    assert!(harness.directory.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_grant_is_recorded_when_notice_fails() {
    let harness = harness().await;
    let value = harness
        .request_approval(REQUESTER, NOMINEE, ("groups/ops", "Operations"), Expiration::OneHour)
        .await;
    let claim = harness
        .workflow
        .approve(&value, &interaction(APPROVER))
        .await
        .unwrap();

    harness.chat.fail_next_posts(1);
    let grant = harness.workflow.complete_approval(claim).await.unwrap();

    assert!(harness.grants.contains(&grant.record.membership_id));
    assert!(!harness.chat.contains("processed successfully"));
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_is_reported_when_notice_fails() {
    let harness = harness().await;
    harness.directory.fail_creates("Permission denied on group");
    let value = harness
        .request_approval(REQUESTER, NOMINEE, ("groups/ops", "Operations"), Expiration::OneHour)
        .await;
    let claim = harness
        .workflow
        .approve(&value, &interaction(APPROVER))
        .await
        .unwrap();

    harness.chat.fail_next_posts(1);
    let err = harness.workflow.complete_approval(claim).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Directory(_)));
    assert!(harness.grants.is_empty());
}
