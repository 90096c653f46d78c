//! Table update timestamps.
//!
//! Cached results record the timestamp they were read at; a result is stale
//! once any of its query spaces has been invalidated at or after that time.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

/// Tracks when each query space was last modified.
pub trait UpdateTimestamps: Send + Sync {
    /// A timestamp later than every one handed out before.
    fn next_timestamp(&self) -> u64;

    /// Record that `spaces` were modified now.
    fn invalidate(&self, spaces: &BTreeSet<String>);

    /// Whether a result read at `timestamp` from `spaces` is still current.
    fn is_up_to_date(&self, spaces: &BTreeSet<String>, timestamp: u64) -> bool;
}

/// Process-local update timestamps driven by a logical clock.
#[derive(Debug, Default)]
pub struct InMemoryUpdateTimestamps {
    clock: AtomicU64,
    invalidated: DashMap<String, u64>,
}

impl InMemoryUpdateTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last invalidation of `space`, if it was ever invalidated.
    pub fn last_invalidation(&self, space: &str) -> Option<u64> {
        self.invalidated.get(space).map(|ts| *ts)
    }
}

impl UpdateTimestamps for InMemoryUpdateTimestamps {
    fn next_timestamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn invalidate(&self, spaces: &BTreeSet<String>) {
        let timestamp = self.next_timestamp();
        for space in spaces {
            debug!(space = %space, timestamp, "Invalidating query space");
            self.invalidated.insert(space.clone(), timestamp);
        }
    }

    fn is_up_to_date(&self, spaces: &BTreeSet<String>, timestamp: u64) -> bool {
        spaces.iter().all(|space| {
            self.invalidated
                .get(space)
                .map_or(true, |invalidated| *invalidated < timestamp)
        })
    }
}
