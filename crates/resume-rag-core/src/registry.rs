//! The live-index registry.
//!
//! Holds exactly one live [`IndexSnapshot`] behind an `Arc`. Readers clone
//! the `Arc` once per query and keep using that snapshot until they drop
//! it, regardless of how many publishes happen in between. A snapshot is
//! freed when the last query holding it finishes.
//!
//! The lock is held only long enough to clone or replace the `Arc`, never
//! across a build or a search, so a publish never waits on a query and a
//! query never waits on a build.

use std::sync::{Arc, RwLock};

use crate::error::BuildError;
use crate::index::{IndexSnapshot, Metric};

pub struct IndexRegistry {
    live: RwLock<Arc<IndexSnapshot>>,
}

impl IndexRegistry {
    /// Start with an empty version-0 snapshot.
    pub fn new(metric: Metric) -> Self {
        Self::with_snapshot(IndexSnapshot::empty(metric))
    }

    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            live: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The live snapshot. Hold the returned `Arc` for the whole query.
    pub fn current(&self) -> Arc<IndexSnapshot> {
        let guard = self.live.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Version of the live snapshot.
    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Atomically make `snapshot` live.
    ///
    /// Rejects snapshots whose version is not strictly greater than the
    /// live one; the live reference is then left untouched. Returns the
    /// published `Arc`.
    pub fn publish(&self, snapshot: IndexSnapshot) -> Result<Arc<IndexSnapshot>, BuildError> {
        let mut guard = self.live.write().unwrap_or_else(|e| e.into_inner());
        if snapshot.version() <= guard.version() {
            return Err(BuildError::StaleVersion {
                live: guard.version(),
                offered: snapshot.version(),
            });
        }
        let published = Arc::new(snapshot);
        *guard = Arc::clone(&published);
        Ok(published)
    }
}
