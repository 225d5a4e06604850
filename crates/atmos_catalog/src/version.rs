//! Catalog version token.
//!
//! The version component in every result name is the sync layer's state
//! digest. When the digest moves, everything named under an older version
//! is stale and registered invalidation hooks run.

use crate::transport::SyncSocket;
use atmos_ndn::Component;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Version used before the sync layer has produced a digest.
pub const INITIAL_VERSION: &str = "initial";

type Hook = Box<dyn Fn() + Send + Sync>;

/// Tracks the sync digest and fans out invalidations.
pub struct VersionTracker {
    sync: Arc<dyn SyncSocket>,
    last: Mutex<Option<Component>>,
    hooks: Mutex<Vec<Hook>>,
}

impl VersionTracker {
    /// Creates a tracker over `sync`.
    pub fn new(sync: Arc<dyn SyncSocket>) -> Self {
        Self {
            sync,
            last: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback run whenever the version changes.
    pub fn on_change(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Returns the current version component, running invalidation hooks
    /// first if it differs from the one last observed.
    pub fn current(&self) -> Component {
        let version = match self.sync.current_digest() {
            Some(digest) if !digest.is_empty() => Component::new(digest),
            _ => Component::from(INITIAL_VERSION),
        };
        let changed = {
            let mut last = self.last.lock();
            let changed = last.as_ref().is_some_and(|prev| *prev != version);
            *last = Some(version.clone());
            changed
        };
        if changed {
            info!(version = %version, "catalog version changed");
            for hook in self.hooks.lock().iter() {
                hook();
            }
        }
        version
    }
}

impl std::fmt::Debug for VersionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionTracker")
            .field("last", &*self.last.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockSyncSocket;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn sentinel_without_digest() {
        let sync = Arc::new(MockSyncSocket::new());
        let tracker = VersionTracker::new(sync);
        assert_eq!(tracker.current(), Component::from(INITIAL_VERSION));
    }

    #[test]
    fn hooks_run_on_change_only() {
        let sync = Arc::new(MockSyncSocket::new());
        let tracker = VersionTracker::new(sync.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        tracker.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tracker.current();
        tracker.current();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        sync.set_digest(Some(vec![0xab, 0xcd]));
        assert_eq!(tracker.current(), Component::new(vec![0xab, 0xcd]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tracker.current();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
