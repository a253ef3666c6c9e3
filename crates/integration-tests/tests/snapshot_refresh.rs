//! Directory snapshot replacement.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use gatekeeper_bot::directory::Directory;
use gatekeeper_bot::services::SnapshotCache;
use gatekeeper_core::Email;
use gatekeeper_integration_tests::{CUSTOMER_ID, FakeDirectory};
use tokio::sync::watch;

fn alice() -> Email {
    Email::parse("alice@example.com").unwrap()
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let directory = FakeDirectory::new()
        .with_group("groups/eng", "Engineering", &[])
        .with_group("groups/ops", "Operations", &[]);
    let cache = SnapshotCache::new();

    let first = cache.refresh_once(&directory, CUSTOMER_ID).await.unwrap();
    assert_eq!(first.groups.len(), 2);

    directory.fail_listing(Some("backend unavailable"));
    directory.remove_group("groups/ops");
    assert!(cache.refresh_once(&directory, CUSTOMER_ID).await.is_err());

    let current = cache.current_snapshot().unwrap();
    assert!(Arc::ptr_eq(&first, &current));
    assert_eq!(cache.eligible_groups(&alice()).len(), 2);
}

#[tokio::test]
async fn test_readers_keep_their_snapshot_across_replacement() {
    let directory = FakeDirectory::new().with_group("groups/eng", "Engineering", &[]);
    let cache = SnapshotCache::new();
    cache.refresh_once(&directory, CUSTOMER_ID).await.unwrap();

    let held = cache.current_snapshot().unwrap();
    directory.remove_group("groups/eng");
    cache.refresh_once(&directory, CUSTOMER_ID).await.unwrap();

    assert_eq!(held.groups.len(), 1, "old reader sees a whole old snapshot");
    assert!(cache.current_snapshot().unwrap().groups.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_loop_picks_up_new_memberships() {
    let directory = Arc::new(
        FakeDirectory::new()
            .with_group("groups/eng", "Engineering", &[])
            .with_group("groups/ops", "Operations", &[]),
    );
    let cache = SnapshotCache::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = cache.spawn_refresh_loop(
        directory.clone(),
        CUSTOMER_ID.to_string(),
        Duration::from_secs(60),
        shutdown_rx,
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(cache.is_ready());
    assert_eq!(cache.eligible_groups(&alice()).len(), 2);

    directory
        .create_membership(
            &gatekeeper_core::GroupId::new("groups/eng"),
            &alice(),
            &[gatekeeper_core::MembershipRole::member()],
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    let eligible = cache.eligible_groups(&alice());
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].0.as_str(), "groups/ops");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
