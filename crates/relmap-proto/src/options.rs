//! Per-execution query options.

use serde::{Deserialize, Serialize};

use crate::lock::LockOptions;

/// Offset and limit applied to a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RowSelection {
    /// Zero-based index of the first row to return.
    pub first_row: Option<u32>,
    /// Maximum number of rows to return.
    pub max_rows: Option<u32>,
}

impl RowSelection {
    /// A selection with no offset or limit.
    pub fn none() -> Self {
        Self::default()
    }

    /// Limit the selection to `max_rows`.
    pub fn limit(max_rows: u32) -> Self {
        Self {
            first_row: None,
            max_rows: Some(max_rows),
        }
    }

    /// Select `max_rows` starting at `first_row`.
    pub fn page(first_row: u32, max_rows: u32) -> Self {
        Self {
            first_row: Some(first_row),
            max_rows: Some(max_rows),
        }
    }

    /// Whether a non-zero offset is present.
    pub fn has_first_row(&self) -> bool {
        self.first_row.is_some_and(|f| f > 0)
    }

    /// Whether a positive limit is present.
    pub fn has_max_rows(&self) -> bool {
        self.max_rows.is_some_and(|m| m > 0)
    }

    /// Whether the selection restricts the rows at all.
    pub fn defines_limits(&self) -> bool {
        self.has_first_row() || self.has_max_rows()
    }
}

/// Interaction with the query results cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CacheMode {
    /// Read from and write to the cache.
    #[default]
    Normal,
    /// Neither read nor write.
    Ignore,
    /// Read only.
    Get,
    /// Write only.
    Put,
    /// Write only, overwriting whatever is cached.
    Refresh,
}

impl CacheMode {
    /// Whether cached results may be read.
    pub fn is_get_enabled(&self) -> bool {
        matches!(self, CacheMode::Normal | CacheMode::Get)
    }

    /// Whether results may be written back.
    pub fn is_put_enabled(&self) -> bool {
        matches!(self, CacheMode::Normal | CacheMode::Put | CacheMode::Refresh)
    }

    /// Parse a cache mode name, case-insensitively.
    pub fn from_name(name: &str) -> Option<CacheMode> {
        let mode = match name.trim().to_ascii_lowercase().as_str() {
            "normal" => CacheMode::Normal,
            "ignore" => CacheMode::Ignore,
            "get" => CacheMode::Get,
            "put" => CacheMode::Put,
            "refresh" => CacheMode::Refresh,
            _ => return None,
        };
        Some(mode)
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CacheMode::Normal => "NORMAL",
            CacheMode::Ignore => "IGNORE",
            CacheMode::Get => "GET",
            CacheMode::Put => "PUT",
            CacheMode::Refresh => "REFRESH",
        }
    }
}

/// Cursor navigation requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScrollMode {
    /// Forward-only cursor.
    #[default]
    ForwardOnly,
    /// Bidirectional cursor that does not see concurrent changes.
    ScrollInsensitive,
    /// Bidirectional cursor that sees concurrent changes.
    ScrollSensitive,
}

impl ScrollMode {
    /// Whether the cursor can move backwards.
    pub fn is_scrollable(&self) -> bool {
        !matches!(self, ScrollMode::ForwardOnly)
    }
}

/// Options governing one query execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Offset and limit.
    #[serde(default)]
    pub selection: RowSelection,
    /// Lock request.
    #[serde(default)]
    pub lock_options: LockOptions,
    /// Whether results of this query may be cached.
    #[serde(default)]
    pub cacheable: bool,
    /// Cache mode override; falls back to the session's mode.
    #[serde(default)]
    pub cache_mode: Option<CacheMode>,
    /// Query results cache region; falls back to the default region.
    #[serde(default)]
    pub result_cache_region: Option<String>,
    /// JDBC fetch size hint.
    #[serde(default)]
    pub fetch_size: Option<u32>,
    /// Statement timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u32>,
    /// Comment prepended to the generated SQL.
    #[serde(default)]
    pub comment: Option<String>,
}

impl QueryOptions {
    /// Options with every setting at its default.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the row selection.
    pub fn with_selection(mut self, selection: RowSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Set the lock options.
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    /// Mark the query as cacheable.
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Override the cache mode.
    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    /// Use a named results cache region.
    pub fn with_cache_region(mut self, region: impl Into<String>) -> Self {
        self.result_cache_region = Some(region.into());
        self
    }

    /// Set the fetch size hint.
    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    /// Set the statement timeout.
    pub fn with_timeout_secs(mut self, timeout: u32) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Set the SQL comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
