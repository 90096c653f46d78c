//! Query results cache regions by name.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::results::{
    QueryResultsCache, StandardQueryResultsCache, DEFAULT_QUERY_CACHE_MAX_ENTRIES,
};
use super::timestamps::{InMemoryUpdateTimestamps, UpdateTimestamps};

/// Name of the region used when a query names none.
pub const DEFAULT_QUERY_RESULTS_REGION: &str = "default-query-results-region";

/// Owns the results cache regions and the timestamps they share.
///
/// Regions are created on first use.
pub struct QueryCacheRegistry {
    default_region: String,
    regions: DashMap<String, Arc<dyn QueryResultsCache>>,
    timestamps: Arc<dyn UpdateTimestamps>,
    /// Capacity of regions created on first use.
    max_entries: usize,
}

impl QueryCacheRegistry {
    pub fn new(default_region: impl Into<String>) -> Self {
        Self::with_timestamps(default_region, Arc::new(InMemoryUpdateTimestamps::new()))
    }

    pub fn with_timestamps(
        default_region: impl Into<String>,
        timestamps: Arc<dyn UpdateTimestamps>,
    ) -> Self {
        Self {
            default_region: default_region.into(),
            regions: DashMap::new(),
            timestamps,
            max_entries: DEFAULT_QUERY_CACHE_MAX_ENTRIES,
        }
    }

    /// Capacity of each region created from now on.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// The region named `name`, or the default region.
    pub fn region(&self, name: Option<&str>) -> Arc<dyn QueryResultsCache> {
        let name = name.unwrap_or(&self.default_region);
        self.regions
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(
                    StandardQueryResultsCache::new(name, self.timestamps.clone())
                        .with_max_entries(self.max_entries),
                )
            })
            .clone()
    }

    /// Register a custom region, replacing any region of the same name.
    pub fn register(&self, cache: Arc<dyn QueryResultsCache>) {
        self.regions.insert(cache.region_name().to_string(), cache);
    }

    /// Mark `spaces` modified, making cached results that read them stale.
    pub fn invalidate(&self, spaces: &BTreeSet<String>) {
        self.timestamps.invalidate(spaces);
    }

    /// Drop all entries of every region.
    pub fn clear(&self) {
        for region in self.regions.iter() {
            region.value().clear();
        }
    }

    pub fn timestamps(&self) -> &Arc<dyn UpdateTimestamps> {
        &self.timestamps
    }
}

impl Default for QueryCacheRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_RESULTS_REGION)
    }
}

impl std::fmt::Debug for QueryCacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCacheRegistry")
            .field("default_region", &self.default_region)
            .field("regions", &self.regions.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryKey;
    use relmap_proto::{RowSelection, Value};

    #[test]
    fn test_regions_are_created_once() {
        let registry = QueryCacheRegistry::default();
        let a = registry.region(None);
        let b = registry.region(Some(DEFAULT_QUERY_RESULTS_REGION));
        assert!(Arc::ptr_eq(&a, &b));
        let named = registry.region(Some("customers"));
        assert_eq!(named.region_name(), "customers");
        assert!(!Arc::ptr_eq(&a, &named));
    }

    #[test]
    fn test_regions_take_configured_capacity() {
        let registry = QueryCacheRegistry::default().with_max_entries(1);
        let region = registry.region(None);
        let spaces: BTreeSet<String> = ["orders".to_string()].into_iter().collect();
        for n in 0..3 {
            let key = QueryKey::new(format!("select {n}"), &RowSelection::none(), &[], None).unwrap();
            let ts = region.timestamp();
            assert!(region.put(&key, vec![vec![Value::Int64(n)]], &spaces, ts).unwrap());
        }
        let last = QueryKey::new("select 2", &RowSelection::none(), &[], None).unwrap();
        let first = QueryKey::new("select 0", &RowSelection::none(), &[], None).unwrap();
        assert_eq!(region.get(&last, &spaces).unwrap(), Some(vec![vec![Value::Int64(2)]]));
        assert_eq!(region.get(&first, &spaces).unwrap(), None);
    }
}
