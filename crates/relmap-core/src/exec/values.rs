//! Sources of raw rows for one execution.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::cursor::LiveCursor;
use crate::cache::{QueryKey, QueryResultsCache};
use crate::error::Error;
use relmap_proto::Value;

/// Rows being collected for a results cache region.
pub(crate) struct CacheWrite {
    pub(crate) cache: Arc<dyn QueryResultsCache>,
    pub(crate) key: QueryKey,
    pub(crate) spaces: BTreeSet<String>,
    /// Taken before execution so that changes made while the rows are read
    /// make the entry stale.
    pub(crate) timestamp: u64,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl CacheWrite {
    pub(crate) fn new(
        cache: Arc<dyn QueryResultsCache>,
        key: QueryKey,
        spaces: BTreeSet<String>,
    ) -> Self {
        let timestamp = cache.timestamp();
        Self {
            cache,
            key,
            spaces,
            timestamp,
            rows: Vec::new(),
        }
    }

    fn write(self) {
        let region = self.cache.region_name().to_string();
        if let Err(e) = self
            .cache
            .put(&self.key, self.rows, &self.spaces, self.timestamp)
        {
            warn!(error = %e, region = %region, "Failed to cache query results");
        }
    }
}

/// Raw rows from either a live result set or a cache hit.
pub(crate) enum JdbcValues {
    Live {
        cursor: LiveCursor,
        cache_write: Option<CacheWrite>,
        exhausted: bool,
    },
    CacheHit {
        rows: std::vec::IntoIter<Vec<Value>>,
    },
}

impl JdbcValues {
    pub(crate) fn live(cursor: LiveCursor, cache_write: Option<CacheWrite>) -> Self {
        JdbcValues::Live {
            cursor,
            cache_write,
            exhausted: false,
        }
    }

    pub(crate) fn cache_hit(rows: Vec<Vec<Value>>) -> Self {
        JdbcValues::CacheHit {
            rows: rows.into_iter(),
        }
    }

    /// The next raw row, or `None` once the source is exhausted.
    pub(crate) fn next_row(&mut self) -> Result<Option<Vec<Value>>, Error> {
        match self {
            JdbcValues::Live {
                cursor,
                cache_write,
                exhausted,
            } => {
                if *exhausted || !cursor.next()? {
                    *exhausted = true;
                    return Ok(None);
                }
                let row = cursor.current_row()?;
                if let Some(write) = cache_write.as_mut() {
                    write.rows.push(row.clone());
                }
                Ok(Some(row))
            }
            JdbcValues::CacheHit { rows } => Ok(rows.next()),
        }
    }

    /// Release the cursor and, when every row was read, write the cache.
    ///
    /// A partially read result is never cached.
    pub(crate) fn finish_up(self) -> Result<(), Error> {
        match self {
            JdbcValues::Live {
                mut cursor,
                cache_write,
                exhausted,
            } => {
                cursor.close()?;
                match cache_write {
                    Some(write) if exhausted => write.write(),
                    Some(_) => debug!(sql = cursor.sql(), "Result not fully read, skipping cache put"),
                    None => {}
                }
                Ok(())
            }
            JdbcValues::CacheHit { .. } => Ok(()),
        }
    }
}
