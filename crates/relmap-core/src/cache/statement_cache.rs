//! Compiled statement cache.
//!
//! Keeps immutable compiled selects under a small value key (a lock mode, a
//! fetch profile) so that repeated loads skip translation.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Hit and miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Concurrent map from a key to a shared compiled value.
#[derive(Debug)]
pub struct StatementCache<K: Eq + Hash, V> {
    entries: DashMap<K, Arc<V>>,
    stats: CacheStats,
}

impl<K: Eq + Hash + std::fmt::Debug, V> StatementCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// The value cached under `key`, compiling and inserting it when absent.
    ///
    /// The key's shard stays locked while `compile` runs, so concurrent
    /// callers never compile the same key twice. A failed compile caches
    /// nothing.
    pub fn get_or_try_insert<E>(
        &self,
        key: K,
        compile: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?entry.key(), "Compiling statement for cache");
                let value = Arc::new(compile()?);
                entry.insert(value.clone());
                Ok(value)
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K: Eq + Hash + std::fmt::Debug, V> Default for StatementCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
