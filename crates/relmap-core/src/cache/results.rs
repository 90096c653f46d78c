//! Query results cache regions.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::key::QueryKey;
use super::timestamps::UpdateTimestamps;
use crate::error::Error;
use relmap_proto::{CachedRows, Value};

/// A region holding raw result rows.
///
/// Rows are stored before decoding or transformation, so any transformer can
/// be applied to a hit.
pub trait QueryResultsCache: Send + Sync {
    /// Region name.
    fn region_name(&self) -> &str;

    /// Cached rows for `key`, unless missing or stale with respect to `spaces`.
    fn get(&self, key: &QueryKey, spaces: &BTreeSet<String>) -> Result<Option<Vec<Vec<Value>>>, Error>;

    /// Cache `rows` read at `timestamp`. Returns whether the rows were stored.
    fn put(
        &self,
        key: &QueryKey,
        rows: Vec<Vec<Value>>,
        spaces: &BTreeSet<String>,
        timestamp: u64,
    ) -> Result<bool, Error>;

    /// Timestamp to record for a result about to be read.
    fn timestamp(&self) -> u64;

    /// Drop every entry.
    fn clear(&self);
}

/// Entries a region holds unless configured otherwise.
pub const DEFAULT_QUERY_CACHE_MAX_ENTRIES: usize = 1024;

struct CachedEntry {
    /// Timestamp the rows were read at.
    timestamp: u64,
    hits: AtomicU64,
    bytes: Vec<u8>,
}

/// Region storing rkyv-encoded rows in memory, validated against
/// [`UpdateTimestamps`].
///
/// Holds at most `max_entries` entries. A full region evicts the entry with
/// the fewest hits, the oldest first among equals. Stale entries are dropped
/// when a lookup finds them.
pub struct StandardQueryResultsCache {
    region: String,
    entries: RwLock<HashMap<QueryKey, CachedEntry>>,
    timestamps: Arc<dyn UpdateTimestamps>,
    max_entries: usize,
    evictions: AtomicU64,
}

impl StandardQueryResultsCache {
    pub fn new(region: impl Into<String>, timestamps: Arc<dyn UpdateTimestamps>) -> Self {
        Self {
            region: region.into(),
            entries: RwLock::new(HashMap::new()),
            timestamps,
            max_entries: DEFAULT_QUERY_CACHE_MAX_ENTRIES,
            evictions: AtomicU64::new(0),
        }
    }

    /// Limit the region to `max_entries` entries, at least one.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of cached entries, stale ones not yet looked up included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped to make room since the region was created.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn evict_one(&self, entries: &mut HashMap<QueryKey, CachedEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| (entry.hits.load(Ordering::Relaxed), entry.timestamp))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(region = %self.region, "Evicted query results cache entry");
        }
    }
}

impl std::fmt::Debug for StandardQueryResultsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardQueryResultsCache")
            .field("region", &self.region)
            .field("entries", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl QueryResultsCache for StandardQueryResultsCache {
    fn region_name(&self) -> &str {
        &self.region
    }

    fn get(&self, key: &QueryKey, spaces: &BTreeSet<String>) -> Result<Option<Vec<Vec<Value>>>, Error> {
        let (timestamp, bytes) = match self.entries.read().get(key) {
            Some(entry) => (entry.timestamp, entry.bytes.clone()),
            None => {
                debug!(region = %self.region, "Query results cache miss");
                return Ok(None);
            }
        };
        if !self.timestamps.is_up_to_date(spaces, timestamp) {
            debug!(region = %self.region, timestamp, "Removing stale query results");
            let mut entries = self.entries.write();
            // A concurrent put may have replaced the entry with fresh rows.
            if entries.get(key).is_some_and(|entry| entry.timestamp == timestamp) {
                entries.remove(key);
            }
            return Ok(None);
        }
        let cached = CachedRows::from_bytes(&bytes)?;
        if let Some(entry) = self.entries.read().get(key) {
            entry.hits.fetch_add(1, Ordering::Relaxed);
        }
        debug!(region = %self.region, rows = cached.rows.len(), "Query results cache hit");
        Ok(Some(cached.rows))
    }

    fn put(
        &self,
        key: &QueryKey,
        rows: Vec<Vec<Value>>,
        spaces: &BTreeSet<String>,
        timestamp: u64,
    ) -> Result<bool, Error> {
        if !self.timestamps.is_up_to_date(spaces, timestamp) {
            debug!(
                region = %self.region,
                timestamp,
                "Not caching query results, a query space changed while they were read"
            );
            return Ok(false);
        }
        let row_count = rows.len();
        let bytes = CachedRows::new(timestamp, rows).to_bytes()?;
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            self.evict_one(&mut entries);
        }
        entries.insert(
            key.clone(),
            CachedEntry {
                timestamp,
                hits: AtomicU64::new(0),
                bytes,
            },
        );
        debug!(region = %self.region, rows = row_count, "Cached query results");
        Ok(true)
    }

    fn timestamp(&self) -> u64 {
        self.timestamps.next_timestamp()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
