//! Signed Slack callbacks into the event queue, and on through the dispatcher.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gatekeeper_bot::routes;
use gatekeeper_bot::services::{Dispatcher, InboundEvent, SnapshotCache, event_channel};
use gatekeeper_bot::slack::SignatureVerifier;
use gatekeeper_bot::slack::messages::action;
use gatekeeper_bot::state::AppState;
use gatekeeper_core::Expiration;
use gatekeeper_integration_tests::{
    CHANNEL, FakeDirectory, Harness, RecordingTransport, Sent, decode,
};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tower::ServiceExt;

const SECRET: &str = "8f3a9c1e7b2d4f6a0c5e9b1d3f7a2c4e";

fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(SecretString::from(SECRET))
}

fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string()
}

fn app(snapshots: SnapshotCache) -> (axum::Router, mpsc::Receiver<InboundEvent>) {
    let (tx, rx) = event_channel();
    let state = AppState::new(
        verifier(),
        tx,
        snapshots,
        Arc::new(RecordingTransport::new()),
        Arc::new(FakeDirectory::new()),
    );
    (routes::routes().with_state(state), rx)
}

fn signed(uri: &str, body: &str) -> Request<Body> {
    let timestamp = now();
    let signature = verifier().sign(&timestamp, body).unwrap();
    Request::post(uri)
        .header("X-Slack-Request-Timestamp", timestamp)
        .header("X-Slack-Signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn interaction_body(json: &str) -> String {
    let encoded: String = json
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                char::from(b).to_string()
            }
            b' ' => "+".to_string(),
            other => format!("%{other:02X}"),
        })
        .collect();
    format!("payload={encoded}")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_readiness_waits_for_snapshot() {
    let snapshots = SnapshotCache::new();
    let (app, _rx) = app(snapshots.clone());

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    snapshots.refresh_once(&FakeDirectory::new(), "C0test").await.unwrap();
    let response = app
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Events API
// =============================================================================

#[tokio::test]
async fn test_url_verification_echoes_challenge() {
    let (app, _rx) = app(SnapshotCache::new());
    let body = r#"{"type":"url_verification","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P","token":"t"}"#;

    let response = app.oneshot(signed("/slack/events", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response)
        .await
        .contains("3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"));
}

#[tokio::test]
async fn test_app_mention_is_enqueued() {
    let (app, mut rx) = app(SnapshotCache::new());
    let body = r#"{"type":"event_callback","event":{"type":"app_mention","user":"U1","channel":"C1","text":"<@U0BOT> add member","ts":"1.0"}}"#;

    let response = app.oneshot(signed("/slack/events", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(matches!(
        rx.try_recv().unwrap(),
        InboundEvent::Mention { user, channel, text }
            if user.as_str() == "U1" && channel.as_str() == "C1" && text == "<@U0BOT> add member"
    ));
}

#[tokio::test]
async fn test_redelivered_mention_is_not_enqueued_twice() {
    let (app, mut rx) = app(SnapshotCache::new());
    let body = r#"{"type":"event_callback","event":{"type":"app_mention","user":"U1","channel":"C1","text":"add member"}}"#;

    let mut request = signed("/slack/events", body);
    request
        .headers_mut()
        .insert("X-Slack-Retry-Num", "1".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let (app, mut rx) = app(SnapshotCache::new());
    let body = r#"{"type":"event_callback","event":{"type":"app_mention","user":"U1","channel":"C1","text":"add member"}}"#;

    let mut request = signed("/slack/events", body);
    request
        .headers_mut()
        .insert("X-Slack-Signature", "v0=deadbeef".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let unsigned = Request::post("/slack/events")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(rx.try_recv().is_err());
}

// =============================================================================
// Interactivity
// =============================================================================

#[tokio::test]
async fn test_block_action_is_enqueued() {
    let (app, mut rx) = app(SnapshotCache::new());
    let body = interaction_body(
        r#"{"type":"block_actions","user":{"id":"U_REQ"},"channel":{"id":"C1"},"response_url":"https://hooks.slack.com/actions/1","actions":[{"action_id":"cancel","type":"button","value":"req 1"}]}"#,
    );

    let response = app
        .oneshot(signed("/slack/interactions", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let InboundEvent::Action(event) = rx.try_recv().unwrap() else {
        panic!("expected an action");
    };
    assert_eq!(event.action_id, action::CANCEL);
    assert_eq!(event.value, "req 1");
    assert_eq!(event.interaction.actor.as_str(), "U_REQ");
}

#[tokio::test]
async fn test_interaction_without_actions_is_bad_request() {
    let (app, mut rx) = app(SnapshotCache::new());
    let body = interaction_body(
        r#"{"type":"block_actions","user":{"id":"U"},"channel":{"id":"C"},"response_url":"u","actions":[]}"#,
    );

    let response = app
        .oneshot(signed("/slack/interactions", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(rx.try_recv().is_err());
}

// =============================================================================
// Dispatcher
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dispatcher_routes_mentions() {
    let harness = Harness::new(FakeDirectory::new(), RecordingTransport::new()).await;
    let (_tx, rx) = event_channel();
    let dispatcher = Dispatcher::new(harness.workflow.clone(), rx);

    let mention = |text: &str| InboundEvent::Mention {
        user: gatekeeper_core::UserId::new("U_REQ"),
        channel: gatekeeper_core::ChannelId::new(CHANNEL),
        text: text.to_string(),
    };

    assert!(dispatcher.dispatch(mention("<@U0BOT> add member")).await.is_none());
    assert!(dispatcher.dispatch(mention("<@U0BOT> hello")).await.is_none());

    let sent = harness.chat.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|s| matches!(s, Sent::Ephemeral { .. })));
    assert!(sent[1].render().contains("Usage"));
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_spawns_approval_completion() {
    let harness = Harness::new(
        FakeDirectory::new().with_group("groups/ops", "Operations", &[]),
        RecordingTransport::new()
            .with_email("U_ALICE", "alice@example.com")
            .with_approver("U_APPROVER"),
    )
    .await;
    let value = harness
        .request_approval("U_REQ", "U_ALICE", ("groups/ops", "Operations"), Expiration::SixHours)
        .await;

    let (tx, rx) = event_channel();
    let dispatcher = Dispatcher::new(harness.workflow.clone(), rx);
    drop(tx);

    let event = InboundEvent::Action(gatekeeper_bot::services::ActionEvent {
        action_id: action::ALLOW_ADDING_USER.to_string(),
        value: value.clone(),
        interaction: gatekeeper_integration_tests::interaction("U_APPROVER"),
        selections: gatekeeper_bot::services::Selections::default(),
    });

    let completion = dispatcher.dispatch(event.clone()).await.expect("completion spawned");
    completion.await.unwrap();
    assert_eq!(harness.grants.len(), 1);
    assert_eq!(harness.directory.created()[0].0, decode(&value).group_id);

    // A replayed click is rejected in order and spawns nothing
    assert!(dispatcher.dispatch(event).await.is_none());
    assert_eq!(harness.directory.created().len(), 1);
}
