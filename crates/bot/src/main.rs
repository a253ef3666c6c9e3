//! Gatekeeper bot - time-limited group memberships approved in Slack.
//!
//! # Architecture
//!
//! - Axum receives Slack Events API and interactivity callbacks
//! - A single dispatcher task applies workflow transitions in order
//! - Cloud Identity API for group memberships (application-default credentials)
//! - Expiry timers enqueue revocations for a small worker pool
//!
//! All state is in memory; grants outstanding at shutdown are not revoked.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::Router;
use gatekeeper_bot::config::BotConfig;
use gatekeeper_bot::directory::{CloudIdentityClient, Directory, OperationPoller};
use gatekeeper_bot::routes;
use gatekeeper_bot::services::{
    Dispatcher, GrantStore, RequestTable, SnapshotCache, WorkflowDeps, WorkflowService,
    event_channel, spawn_revocation_workers,
};
use gatekeeper_bot::slack::{ChatTransport, SignatureVerifier, SlackClient};
use gatekeeper_bot::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::watch;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &BotConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = BotConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gatekeeper_bot=info,tower_http=info".into());

    // JSON on Cloud Run for structured log parsing, text locally
    let is_cloud_run = std::env::var("K_SERVICE").is_ok();
    let json_layer =
        is_cloud_run.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_cloud_run).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let directory: Arc<dyn Directory> = Arc::new(
        CloudIdentityClient::from_environment()
            .await
            .expect("Failed to create Cloud Identity client"),
    );
    let chat: Arc<dyn ChatTransport> = Arc::new(SlackClient::new(config.slack.bot_token.clone()));
    let poller = OperationPoller::new(config.poller);

    // Expiry timers feed the revocation workers
    let (grants, revocations) = GrantStore::new();
    let workers = spawn_revocation_workers(
        config.revocation_workers,
        revocations,
        Arc::clone(&directory),
        poller,
    );
    tracing::info!(count = workers.len(), "Revocation workers started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let snapshots = SnapshotCache::new();
    let refresh = snapshots.spawn_refresh_loop(
        Arc::clone(&directory),
        config.org_customer_id.clone(),
        config.snapshot_refresh,
        shutdown_rx,
    );

    let (events_tx, events_rx) = event_channel();
    let state = AppState::new(
        SignatureVerifier::new(config.slack.signing_secret.clone()),
        events_tx,
        snapshots.clone(),
        chat,
        directory,
    );

    let workflow = WorkflowService::new(WorkflowDeps {
        chat: state.chat(),
        directory: state.directory(),
        requests: RequestTable::new(config.request_ttl),
        snapshots,
        grants: grants.clone(),
        poller,
        approvers: config.approver_group_id.clone(),
    });
    let dispatcher = tokio::spawn(Dispatcher::new(workflow, events_rx).run());

    let app = Router::new()
        .merge(routes::routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("gatekeeper listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // The router (and its event sender) is gone, so the dispatcher drains and exits
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "Dispatcher panicked");
    }
    if let Err(e) = refresh.await {
        tracing::error!(error = %e, "Snapshot refresh loop panicked");
    }
    grants.shutdown();
    tracing::info!("Shutdown complete");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
