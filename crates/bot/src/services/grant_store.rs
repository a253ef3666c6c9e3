//! Grant expiry store.
//!
//! Tracks memberships created by approved requests. Each entry owns a timer
//! task; when it fires the entry is removed and a [`RevocationJob`] is queued
//! for the revocation workers. The timer itself never calls the directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use gatekeeper_core::{Expiration, GrantRecord, MembershipId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A membership whose grant has expired and must be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationJob {
    pub record: GrantRecord,
}

struct Entry {
    record: GrantRecord,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    entries: Mutex<HashMap<MembershipId, Entry>>,
    generations: AtomicU64,
    jobs: mpsc::UnboundedSender<RevocationJob>,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<MembershipId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expire(&self, id: &MembershipId, generation: u64) {
        let record = {
            let mut entries = self.entries();
            match entries.get(id) {
                Some(entry) if entry.generation == generation => {
                    entries.remove(id).map(|entry| entry.record)
                }
                _ => None,
            }
        };

        let Some(record) = record else {
            debug!(membership = %id, "Stale grant timer ignored");
            return;
        };

        info!(membership = %id, expiration = %record.expiration, "Grant expired; queueing revocation");
        if self.jobs.send(RevocationJob { record }).is_err() {
            warn!(membership = %id, "Revocation queue closed; grant will not be revoked");
        }
    }
}

/// Shared handle to the grant expiry store.
#[derive(Clone)]
pub struct GrantStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantStore")
            .field("len", &self.len())
            .finish()
    }
}

impl GrantStore {
    /// Create a store and the receiving end of its revocation queue.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RevocationJob>) {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let store = Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                jobs,
            }),
        };
        (store, receiver)
    }

    /// Track a newly created membership. Its TTL starts now.
    ///
    /// Re-inserting an ID replaces the record and restarts its timer.
    /// Must be called from within a Tokio runtime.
    pub fn insert(&self, membership_id: MembershipId, expiration: Expiration) -> GrantRecord {
        let record = GrantRecord::new(membership_id.clone(), expiration);
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let mut entries = self.inner.entries();
        let timer = {
            let id = membership_id.clone();
            let ttl = expiration.as_duration();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(inner) = weak.upgrade() {
                    inner.expire(&id, generation);
                }
            })
        };

        let previous = entries.insert(
            membership_id.clone(),
            Entry {
                record: record.clone(),
                generation,
                timer,
            },
        );
        drop(entries);

        if let Some(previous) = previous {
            previous.timer.abort();
            debug!(membership = %membership_id, "Replaced existing grant");
        }

        info!(
            membership = %membership_id,
            expiration = %expiration,
            expires_at = %record.expires_at(),
            "Grant recorded"
        );
        record
    }

    /// The record for a membership, if still tracked.
    #[must_use]
    pub fn get(&self, id: &MembershipId) -> Option<GrantRecord> {
        self.inner.entries().get(id).map(|e| e.record.clone())
    }

    /// Whether a membership is still tracked.
    #[must_use]
    pub fn contains(&self, id: &MembershipId) -> bool {
        self.inner.entries().contains_key(id)
    }

    /// Number of tracked grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Whether no grants are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    /// Cancel every outstanding timer and forget all grants.
    pub fn shutdown(&self) {
        let drained: Vec<Entry> = self.inner.entries().drain().map(|(_, e)| e).collect();
        if !drained.is_empty() {
            warn!(
                outstanding = drained.len(),
                "Dropping unexpired grants on shutdown"
            );
        }
        for entry in drained {
            entry.timer.abort();
        }
    }
}
