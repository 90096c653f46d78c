//! Caching.
//!
//! Query results regions hold raw rows keyed by [`QueryKey`] and validated
//! against table update timestamps. The [`StatementCache`] keeps compiled
//! selects for reuse by the entity loaders.

mod key;
mod registry;
mod results;
mod statement_cache;
mod timestamps;

pub use key::QueryKey;
pub use registry::{QueryCacheRegistry, DEFAULT_QUERY_RESULTS_REGION};
pub use results::{
    QueryResultsCache, StandardQueryResultsCache, DEFAULT_QUERY_CACHE_MAX_ENTRIES,
};
pub use statement_cache::{CacheStats, StatementCache};
pub use timestamps::{InMemoryUpdateTimestamps, UpdateTimestamps};
