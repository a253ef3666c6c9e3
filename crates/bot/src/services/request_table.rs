//! In-flight request table.
//!
//! Pending requests are keyed by [`RequestId`] and expire after a TTL. A
//! decision *claims* its request by removing it; whoever gets the entry out
//! owns the outcome, and every later action finds nothing.

use std::time::Duration;

use gatekeeper_core::{PendingRequest, RequestId};
use moka::future::Cache;

/// Upper bound on concurrently pending requests.
const MAX_PENDING: u64 = 10_000;

/// TTL-bounded table of pending requests.
#[derive(Clone)]
pub struct RequestTable {
    cache: Cache<RequestId, PendingRequest>,
}

impl std::fmt::Debug for RequestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTable")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl RequestTable {
    /// Create a table whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_PENDING)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Store or overwrite a request.
    pub async fn put(&self, request: PendingRequest) {
        self.cache.insert(request.id, request).await;
    }

    /// A copy of a live request.
    pub async fn get(&self, id: &RequestId) -> Option<PendingRequest> {
        self.cache.get(id).await
    }

    /// Atomically take a request out of the table.
    ///
    /// Returns `None` if it was never there, has expired, or was already
    /// claimed.
    pub async fn claim(&self, id: &RequestId) -> Option<PendingRequest> {
        // `get` honours the TTL even before the entry is evicted
        self.cache.get(id).await?;
        self.cache.remove(id).await
    }
}
