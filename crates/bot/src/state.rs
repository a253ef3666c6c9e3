//! Application state shared across handlers.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::directory::Directory;
use crate::services::{InboundEvent, SnapshotCache};
use crate::slack::{ChatTransport, SignatureVerifier};

/// Application state shared across all handlers.
///
/// Cheap to clone; everything lives behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    verifier: SignatureVerifier,
    events: mpsc::Sender<InboundEvent>,
    snapshots: SnapshotCache,
    chat: Arc<dyn ChatTransport>,
    directory: Arc<dyn Directory>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("verifier", &self.inner.verifier)
            .field("snapshots", &self.inner.snapshots)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create application state.
    #[must_use]
    pub fn new(
        verifier: SignatureVerifier,
        events: mpsc::Sender<InboundEvent>,
        snapshots: SnapshotCache,
        chat: Arc<dyn ChatTransport>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                verifier,
                events,
                snapshots,
                chat,
                directory,
            }),
        }
    }

    /// Slack request signature verifier.
    #[must_use]
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.inner.verifier
    }

    /// Sender side of the inbound event queue.
    #[must_use]
    pub fn events(&self) -> &mpsc::Sender<InboundEvent> {
        &self.inner.events
    }

    /// Directory snapshot cache.
    #[must_use]
    pub fn snapshots(&self) -> &SnapshotCache {
        &self.inner.snapshots
    }

    /// Outbound chat transport.
    #[must_use]
    pub fn chat(&self) -> Arc<dyn ChatTransport> {
        Arc::clone(&self.inner.chat)
    }

    /// Identity directory client.
    #[must_use]
    pub fn directory(&self) -> Arc<dyn Directory> {
        Arc::clone(&self.inner.directory)
    }
}
