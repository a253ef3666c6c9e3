//! Directory snapshot cache.
//!
//! Holds the most recent complete [`DirectorySnapshot`]. A background loop
//! rebuilds it on a fixed interval and swaps it in whole; readers clone the
//! `Arc` and never observe a partially built snapshot.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use gatekeeper_core::{DirectorySnapshot, Email, Group, GroupId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};

use crate::directory::{Directory, DirectoryError};

/// Shared handle to the latest snapshot.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<Option<Arc<DirectorySnapshot>>>>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl SnapshotCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest snapshot, if any refresh has succeeded yet.
    #[must_use]
    pub fn current_snapshot(&self) -> Option<Arc<DirectorySnapshot>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a snapshot is available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Groups `email` is not yet a member of. Empty until the first refresh.
    #[must_use]
    pub fn eligible_groups(&self, email: &Email) -> Vec<(GroupId, String)> {
        self.current_snapshot()
            .map(|snapshot| snapshot.eligible_groups(email))
            .unwrap_or_default()
    }

    /// A group from the latest snapshot.
    #[must_use]
    pub fn group(&self, id: &GroupId) -> Option<Group> {
        self.current_snapshot()
            .and_then(|snapshot| snapshot.group(id).cloned())
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, snapshot: DirectorySnapshot) -> Arc<DirectorySnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Fetch every group and its memberships and replace the snapshot.
    ///
    /// Any failure abandons the cycle and leaves the previous snapshot in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns the first [`DirectoryError`] encountered.
    #[instrument(skip(self, directory))]
    pub async fn refresh_once(
        &self,
        directory: &dyn Directory,
        customer_id: &str,
    ) -> Result<Arc<DirectorySnapshot>, DirectoryError> {
        let parent = format!("customers/{customer_id}");
        let resources = directory.list_groups(&parent).await?;

        let mut groups = Vec::with_capacity(resources.len());
        for resource in resources {
            let memberships = directory.list_memberships(&resource.name).await?;
            groups.push(Group {
                display_name: resource.label(),
                id: resource.name,
                memberships,
            });
        }

        let snapshot = DirectorySnapshot::new(groups);
        info!(
            groups = snapshot.groups.len(),
            memberships = snapshot.membership_count(),
            "Directory snapshot refreshed"
        );
        Ok(self.replace(snapshot))
    }

    /// Refresh immediately, then every `period` until `shutdown` flips.
    pub fn spawn_refresh_loop(
        &self,
        directory: Arc<dyn Directory>,
        customer_id: String,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = cache.refresh_once(directory.as_ref(), &customer_id).await {
                            error!(error = %e, "Directory snapshot refresh failed; keeping previous snapshot");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Snapshot refresh loop stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use gatekeeper_core::{Membership, MembershipId, MembershipRole, OperationName};

    use super::*;
    use crate::directory::{GroupResource, Operation};

    #[derive(Default)]
    struct StaticDirectory {
        groups: Mutex<Vec<(String, Vec<String>)>>,
        fail_memberships_for: Mutex<Option<String>>,
        list_calls: Mutex<usize>,
    }

    impl StaticDirectory {
        fn set(&self, groups: &[(&str, &[&str])]) {
            *self.groups.lock().unwrap() = groups
                .iter()
                .map(|(g, ms)| ((*g).to_string(), ms.iter().map(|m| (*m).to_string()).collect()))
                .collect();
        }
    }

    #[async_trait]
    impl Directory for StaticDirectory {
        async fn list_groups(&self, parent: &str) -> Result<Vec<GroupResource>, DirectoryError> {
            assert_eq!(parent, "customers/C0");
            *self.list_calls.lock().unwrap() += 1;
            Ok(self
                .groups
                .lock()
                .unwrap()
                .iter()
                .map(|(g, _)| {
                    serde_json::from_value(serde_json::json!({
                        "name": format!("groups/{g}"),
                        "displayName": g.to_uppercase(),
                    }))
                    .unwrap()
                })
                .collect())
        }

        async fn list_memberships(&self, group: &GroupId) -> Result<Vec<Membership>, DirectoryError> {
            if self.fail_memberships_for.lock().unwrap().as_deref() == Some(group.as_str()) {
                return Err(DirectoryError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            let groups = self.groups.lock().unwrap();
            let members: HashMap<_, _> = groups.iter().cloned().collect();
            let name = group.as_str().trim_start_matches("groups/");
            Ok(members
                .get(name)
                .into_iter()
                .flatten()
                .map(|key| Membership {
                    id: MembershipId::new(format!("{group}/memberships/{key}")),
                    member_key: key.clone(),
                    roles: vec![MembershipRole::member()],
                    created_by: None,
                })
                .collect())
        }

        async fn create_membership(
            &self,
            _: &GroupId,
            _: &Email,
            _: &[MembershipRole],
        ) -> Result<Operation, DirectoryError> {
            unreachable!()
        }

        async fn delete_membership(&self, _: &MembershipId) -> Result<Operation, DirectoryError> {
            unreachable!()
        }

        async fn get_operation(&self, _: &OperationName) -> Result<Operation, DirectoryError> {
            unreachable!()
        }
    }

    fn email(raw: &str) -> Email {
        Email::parse(raw).unwrap()
    }

    #[test]
    fn test_empty_cache_has_no_eligible_groups() {
        let cache = SnapshotCache::new();
        assert!(cache.current_snapshot().is_none());
        assert!(!cache.is_ready());
        assert!(cache.eligible_groups(&email("alice@x.com")).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_builds_snapshot() {
        let directory = StaticDirectory::default();
        directory.set(&[("g1", &["alice@x.com"]), ("g2", &[])]);
        let cache = SnapshotCache::new();

        let snapshot = cache.refresh_once(&directory, "C0").await.unwrap();

        assert_eq!(snapshot.groups.len(), 2);
        assert_eq!(snapshot.groups[0].display_name, "G1");
        assert_eq!(
            cache.eligible_groups(&email("alice@x.com")),
            vec![(GroupId::new("groups/g2"), "G2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let directory = StaticDirectory::default();
        directory.set(&[("g1", &[]), ("g2", &[])]);
        let cache = SnapshotCache::new();
        let before = cache.refresh_once(&directory, "C0").await.unwrap();

        directory.set(&[("g1", &[]), ("g2", &[]), ("g3", &[])]);
        *directory.fail_memberships_for.lock().unwrap() = Some("groups/g3".to_string());
        assert!(cache.refresh_once(&directory, "C0").await.is_err());

        let after = cache.current_snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.groups.len(), 2);
    }

    #[tokio::test]
    async fn test_reader_keeps_old_snapshot_across_replace() {
        let directory = StaticDirectory::default();
        directory.set(&[("g1", &[])]);
        let cache = SnapshotCache::new();
        cache.refresh_once(&directory, "C0").await.unwrap();

        let held = cache.current_snapshot().unwrap();
        directory.set(&[("g1", &[]), ("g2", &[])]);
        cache.refresh_once(&directory, "C0").await.unwrap();

        assert_eq!(held.groups.len(), 1);
        assert_eq!(cache.current_snapshot().unwrap().groups.len(), 2);
    }

    #[tokio::test]
    async fn test_group_lookup_reads_latest_snapshot() {
        let directory = StaticDirectory::default();
        directory.set(&[("g1", &["alice@x.com"])]);
        let cache = SnapshotCache::new();
        assert!(cache.group(&GroupId::new("groups/g1")).is_none());

        cache.refresh_once(&directory, "C0").await.unwrap();
        let group = cache.group(&GroupId::new("groups/g1")).unwrap();
        assert_eq!(group.display_name, "G1");
        assert!(group.has_member(&email("alice@x.com")));
        assert!(cache.group(&GroupId::new("groups/g9")).is_none());
    }

    #[tokio::test]
    async fn test_poisoned_lock_still_serves_snapshot() {
        let directory = StaticDirectory::default();
        directory.set(&[("g1", &[])]);
        let cache = SnapshotCache::new();
        cache.refresh_once(&directory, "C0").await.unwrap();

        let poisoner = cache.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("writer panicked while holding the lock");
        })
        .join();
        assert!(result.is_err());
        assert!(cache.inner.is_poisoned());

        assert!(cache.is_ready());
        assert_eq!(cache.current_snapshot().unwrap().groups.len(), 1);
        assert_eq!(cache.eligible_groups(&email("bob@x.com")).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_ticks_and_stops() {
        let directory = Arc::new(StaticDirectory::default());
        directory.set(&[("g1", &[])]);
        let cache = SnapshotCache::new();
        let (tx, rx) = watch::channel(false);

        let handle = cache.spawn_refresh_loop(
            directory.clone(),
            "C0".to_string(),
            Duration::from_secs(60),
            rx,
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(*directory.list_calls.lock().unwrap(), 3);
        assert!(cache.is_ready());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
