//! Select execution.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::context::ExecutionContext;
use super::cursor::LiveCursor;
use super::follow_on::FollowOnLocker;
use super::jdbc::StatementOptions;
use super::scroll::{ResultStream, ScrollableResults};
use super::values::{CacheWrite, JdbcValues};
use super::{CompiledSelect, JdbcParameterBindings};
use crate::cache::{QueryCacheRegistry, QueryKey};
use crate::error::Error;
use crate::results::{FetchMerger, ResultValue, RowReader, RowTransformer};
use relmap_proto::{ScrollMode, Value};

/// Runs compiled selects against the session's connection.
///
/// `list`, `scroll` and `stream` share statement preparation, binding and
/// execution; only `list` goes through the query results cache.
#[derive(Debug, Clone)]
pub struct SelectExecutor {
    caches: Arc<QueryCacheRegistry>,
    query_cache_enabled: bool,
    default_fetch_size: Option<u32>,
}

enum CacheLookup {
    Hit(Vec<Vec<Value>>),
    Miss(Option<CacheWrite>),
}

impl SelectExecutor {
    pub fn new(caches: Arc<QueryCacheRegistry>) -> Self {
        Self {
            caches,
            query_cache_enabled: true,
            default_fetch_size: None,
        }
    }

    pub fn with_query_cache_enabled(mut self, enabled: bool) -> Self {
        self.query_cache_enabled = enabled;
        self
    }

    /// Fetch size used when a query sets none.
    pub fn with_default_fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.default_fetch_size = fetch_size;
        self
    }

    pub fn caches(&self) -> &Arc<QueryCacheRegistry> {
        &self.caches
    }

    /// Read every row, transformed.
    ///
    /// The result set and statement are released before this returns, on
    /// every path. Follow-on locks are taken once all rows are read.
    #[instrument(skip(self, compiled, context, transformer), fields(sql = %compiled.sql))]
    pub fn list<R>(
        &self,
        compiled: &CompiledSelect,
        context: &ExecutionContext<'_>,
        transformer: &dyn RowTransformer<R>,
    ) -> Result<Vec<R>, Error> {
        let bindings = effective_bindings(compiled, context);
        let mut values = self.execute_query(compiled, context, &bindings)?;

        let mut lock_rows = compiled.follow_on.as_ref().map(|_| Vec::new());
        let read = read_rows(compiled, &mut values, transformer, lock_rows.as_mut())
            .map_err(|e| Error::row_processing(&compiled.sql, e));
        let finished = values.finish_up();
        let rows = read?;
        finished?;

        if let (Some(lock), Some(lock_rows)) = (&compiled.follow_on, lock_rows) {
            FollowOnLocker::new(lock.clone(), context.options.timeout_secs)
                .lock_rows(context.session.connection(), &lock_rows)?;
        }
        Ok(transformer.transform_list(rows))
    }

    /// Open a cursor over the transformed rows.
    ///
    /// Selects fetching collections return results that merge rows per
    /// entity and only move forward.
    #[instrument(skip(self, compiled, context, transformer), fields(sql = %compiled.sql))]
    pub fn scroll<R>(
        &self,
        compiled: &CompiledSelect,
        scroll_mode: ScrollMode,
        context: &ExecutionContext<'_>,
        transformer: Arc<dyn RowTransformer<R>>,
    ) -> Result<ScrollableResults<R>, Error> {
        let bindings = effective_bindings(compiled, context);
        let options = self.statement_options(context, StatementOptions::scrollable(scroll_mode));
        let cursor = open_cursor(context, compiled, &bindings, &options)?;
        let follow_on = compiled
            .follow_on
            .clone()
            .map(|lock| FollowOnLocker::new(lock, context.options.timeout_secs));
        Ok(ScrollableResults::new(
            cursor,
            RowReader::new(compiled.mapping.clone()),
            transformer,
            context.session.connection_handle(),
            follow_on,
            compiled.fetches_collections(),
        ))
    }

    /// Lazily read the transformed rows over a forward-only cursor.
    pub fn stream<R>(
        &self,
        compiled: &CompiledSelect,
        context: &ExecutionContext<'_>,
        transformer: Arc<dyn RowTransformer<R>>,
    ) -> Result<ResultStream<R>, Error> {
        let results = self.scroll(compiled, ScrollMode::ForwardOnly, context, transformer)?;
        Ok(ResultStream::new(results))
    }

    fn statement_options(
        &self,
        context: &ExecutionContext<'_>,
        options: StatementOptions,
    ) -> StatementOptions {
        options
            .with_fetch_size(context.options.fetch_size.or(self.default_fetch_size))
            .with_timeout_secs(context.options.timeout_secs)
    }

    fn execute_query(
        &self,
        compiled: &CompiledSelect,
        context: &ExecutionContext<'_>,
        bindings: &JdbcParameterBindings,
    ) -> Result<JdbcValues, Error> {
        let cache_write = match self.lookup_cache(compiled, context, bindings)? {
            CacheLookup::Hit(rows) => return Ok(JdbcValues::cache_hit(rows)),
            CacheLookup::Miss(write) => write,
        };
        let options = self.statement_options(context, StatementOptions::default());
        let cursor = open_cursor(context, compiled, bindings, &options)?;
        Ok(JdbcValues::live(cursor, cache_write))
    }

    fn lookup_cache(
        &self,
        compiled: &CompiledSelect,
        context: &ExecutionContext<'_>,
        bindings: &JdbcParameterBindings,
    ) -> Result<CacheLookup, Error> {
        if !self.query_cache_enabled {
            return Ok(CacheLookup::Miss(None));
        }
        if !context.options.cacheable {
            debug!("Skipping query results cache, query is not cacheable");
            return Ok(CacheLookup::Miss(None));
        }
        let cache_mode = context.cache_mode();
        if !cache_mode.is_get_enabled() && !cache_mode.is_put_enabled() {
            debug!(cache_mode = cache_mode.name(), "Skipping query results cache");
            return Ok(CacheLookup::Miss(None));
        }

        let parameters = bindings.ordered_values(&compiled.parameters)?;
        let key = QueryKey::new(
            compiled.sql.as_str(),
            &context.options.selection,
            &parameters,
            context.session.tenant(),
        )?;
        let region = self
            .caches
            .region(context.options.result_cache_region.as_deref());

        if cache_mode.is_get_enabled() {
            match region.get(&key, &compiled.affected_table_names) {
                Ok(Some(rows)) if !rows.is_empty() => return Ok(CacheLookup::Hit(rows)),
                Ok(Some(_)) => debug!(
                    region = region.region_name(),
                    "Empty cached result, executing query"
                ),
                Ok(None) => {}
                Err(e) => warn!(
                    error = %e,
                    region = region.region_name(),
                    "Failed to read query results cache"
                ),
            }
        } else {
            debug!(cache_mode = cache_mode.name(), "Cache get disabled, executing query");
        }

        if cache_mode.is_put_enabled() {
            let spaces = compiled.affected_table_names.clone();
            Ok(CacheLookup::Miss(Some(CacheWrite::new(region, key, spaces))))
        } else {
            Ok(CacheLookup::Miss(None))
        }
    }
}

fn effective_bindings(compiled: &CompiledSelect, context: &ExecutionContext<'_>) -> JdbcParameterBindings {
    match context.bindings {
        Some(bindings) => compiled.bindings.merged_with(bindings),
        None => compiled.bindings.clone(),
    }
}

fn open_cursor(
    context: &ExecutionContext<'_>,
    compiled: &CompiledSelect,
    bindings: &JdbcParameterBindings,
    options: &StatementOptions,
) -> Result<LiveCursor, Error> {
    let mut cursor = LiveCursor::prepare(context.session.connection(), &compiled.sql, options)?;
    cursor.bind(&compiled.parameters, bindings)?;
    cursor.execute(Some(&compiled.mapping))?;
    Ok(cursor)
}

fn read_rows<R>(
    compiled: &CompiledSelect,
    values: &mut JdbcValues,
    transformer: &dyn RowTransformer<R>,
    mut lock_rows: Option<&mut Vec<Vec<Value>>>,
) -> Result<Vec<R>, Error> {
    let reader = RowReader::new(compiled.mapping.clone());
    let mut merger = compiled.fetches_collections().then(FetchMerger::new);
    let mut rows = Vec::new();

    while let Some(raw) = values.next_row()? {
        let row = reader.read_row(&raw)?;
        if let Some(lock_rows) = lock_rows.as_mut() {
            lock_rows.push(raw);
        }
        let row = match merger.as_mut() {
            Some(merger) => match merger.push(row) {
                Some(completed) => completed,
                None => continue,
            },
            None => row,
        };
        rows.push(transform(&reader, transformer, row)?);
    }
    if let Some(completed) = merger.as_mut().and_then(FetchMerger::finish) {
        rows.push(transform(&reader, transformer, completed)?);
    }
    Ok(rows)
}

fn transform<R>(
    reader: &RowReader,
    transformer: &dyn RowTransformer<R>,
    row: Vec<ResultValue>,
) -> Result<R, Error> {
    transformer.transform_row(reader.reduce(row), reader.user_aliases())
}
