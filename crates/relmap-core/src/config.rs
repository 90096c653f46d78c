//! Engine configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{DEFAULT_QUERY_CACHE_MAX_ENTRIES, DEFAULT_QUERY_RESULTS_REGION};
use crate::error::Error;
use relmap_proto::CacheMode;

/// Enables the query results cache.
pub const USE_QUERY_CACHE: &str = "relmap.cache.use_query_cache";
/// Region used by cacheable queries that name none.
pub const DEFAULT_CACHE_REGION: &str = "relmap.cache.region.default";
/// Entries each query results cache region holds.
pub const QUERY_CACHE_MAX_ENTRIES: &str = "relmap.cache.query.max_entries";
/// Cache mode of new sessions.
pub const CACHE_MODE: &str = "relmap.cache.mode";
/// Fetch size used when a query sets none.
pub const FETCH_SIZE: &str = "relmap.jdbc.fetch_size";
/// Forces follow-on locking on or off, overriding the dialect.
pub const FOLLOW_ON_LOCKING: &str = "relmap.locking.follow_on";
/// Reuse of compiled entity load selects.
pub const STATEMENT_CACHING: &str = "relmap.loader.statement_caching";
/// Dialect name.
pub const DIALECT: &str = "relmap.dialect";

/// Configuration for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether cacheable queries use the query results cache.
    pub query_cache_enabled: bool,

    /// Cache mode of new sessions.
    pub default_cache_mode: CacheMode,

    /// Region used by cacheable queries that name none.
    pub default_cache_region: String,

    /// Entries each results cache region holds before evicting.
    pub query_cache_max_entries: usize,

    /// Reuse compiled selects in entity loaders.
    pub statement_caching: bool,

    /// Follow-on locking override. None defers to the dialect.
    pub follow_on_locking: Option<bool>,

    /// Fetch size used when a query sets none.
    pub default_fetch_size: Option<u32>,

    /// Dialect name (`ansi`, `postgres`, `oracle`, `sqlite`).
    pub dialect: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_cache_enabled: false,
            default_cache_mode: CacheMode::Normal,
            default_cache_region: DEFAULT_QUERY_RESULTS_REGION.to_string(),
            query_cache_max_entries: DEFAULT_QUERY_CACHE_MAX_ENTRIES,
            statement_caching: true,
            follow_on_locking: None,
            default_fetch_size: None,
            dialect: "ansi".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the query results cache.
    pub fn with_query_cache(mut self, enabled: bool) -> Self {
        self.query_cache_enabled = enabled;
        self
    }

    pub fn with_default_cache_mode(mut self, mode: CacheMode) -> Self {
        self.default_cache_mode = mode;
        self
    }

    pub fn with_default_cache_region(mut self, region: impl Into<String>) -> Self {
        self.default_cache_region = region.into();
        self
    }

    pub fn with_query_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.query_cache_max_entries = max_entries;
        self
    }

    pub fn with_statement_caching(mut self, enabled: bool) -> Self {
        self.statement_caching = enabled;
        self
    }

    pub fn with_follow_on_locking(mut self, follow_on: Option<bool>) -> Self {
        self.follow_on_locking = follow_on;
        self
    }

    pub fn with_default_fetch_size(mut self, fetch_size: u32) -> Self {
        self.default_fetch_size = Some(fetch_size);
        self
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Build from `relmap.*` properties. Other keys are ignored; unknown
    /// `relmap.*` keys are logged.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let (key, value) = (key.as_ref().trim(), value.as_ref().trim());
            match key {
                USE_QUERY_CACHE => config.query_cache_enabled = parse_bool(key, value)?,
                DEFAULT_CACHE_REGION => config.default_cache_region = value.to_string(),
                QUERY_CACHE_MAX_ENTRIES => {
                    config.query_cache_max_entries = value.parse().map_err(|_| invalid(key, value))?;
                }
                CACHE_MODE => {
                    config.default_cache_mode = CacheMode::from_name(value)
                        .ok_or_else(|| invalid(key, value))?;
                }
                FETCH_SIZE => {
                    config.default_fetch_size =
                        Some(value.parse().map_err(|_| invalid(key, value))?);
                }
                FOLLOW_ON_LOCKING => config.follow_on_locking = Some(parse_bool(key, value)?),
                STATEMENT_CACHING => config.statement_caching = parse_bool(key, value)?,
                DIALECT => config.dialect = value.to_string(),
                other if other.starts_with("relmap.") => {
                    warn!(key = other, "Ignoring unknown configuration property");
                }
                _ => {}
            }
        }
        Ok(config)
    }

    /// Parse `key = value` lines; blank lines and `#` comments are skipped.
    pub fn from_properties_str(text: &str) -> Result<Self, Error> {
        let mut pairs = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("line {}: expected key = value", number + 1)))?;
            pairs.push((key.to_string(), value.to_string()));
        }
        Self::from_properties(pairs)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> Error {
    Error::Config(format!("invalid value '{value}' for {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.query_cache_enabled);
        assert!(config.statement_caching);
        assert_eq!(config.default_cache_mode, CacheMode::Normal);
        assert_eq!(config.default_cache_region, DEFAULT_QUERY_RESULTS_REGION);
        assert_eq!(config.query_cache_max_entries, DEFAULT_QUERY_CACHE_MAX_ENTRIES);
    }

    #[test]
    fn test_from_json_keeps_missing_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "query_cache_enabled": true, "dialect": "oracle" }"#)
                .unwrap();
        assert!(config.query_cache_enabled);
        assert_eq!(config.dialect, "oracle");
        assert!(config.statement_caching);
    }

    #[test]
    fn test_from_properties_str() {
        let config = EngineConfig::from_properties_str(
            "# engine\n\
             relmap.cache.use_query_cache = true\n\
             relmap.cache.mode = get\n\
             relmap.cache.region.default = results\n\
             relmap.cache.query.max_entries = 64\n\
             relmap.jdbc.fetch_size = 250\n\
             relmap.locking.follow_on = false\n\
             relmap.loader.statement_caching = no\n\
             other.setting = 1\n",
        )
        .unwrap();
        assert!(config.query_cache_enabled);
        assert_eq!(config.default_cache_mode, CacheMode::Get);
        assert_eq!(config.default_cache_region, "results");
        assert_eq!(config.query_cache_max_entries, 64);
        assert_eq!(config.default_fetch_size, Some(250));
        assert_eq!(config.follow_on_locking, Some(false));
        assert!(!config.statement_caching);
    }

    #[test]
    fn test_invalid_property_value() {
        let err = EngineConfig::from_properties([(FETCH_SIZE, "lots")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(EngineConfig::from_properties_str("relmap.dialect").is_err());
    }
}
