//! relmap core - criteria translation, statement execution and result caching.
//!
//! A criteria query (or an id-keyed entity load) is translated against the
//! mapping [`catalog`] into an SQL AST, rendered for a [`dialect`], and
//! executed over a backend [`Connection`]. Rows are decoded by a
//! [`results::RowReader`] and shaped by a [`RowTransformer`]. List results
//! may be kept in a query results [`cache`] region and served from there
//! until a table they touch is invalidated.
//!
//! # Modules
//!
//! - [`catalog`] - Entities, attributes, associations, filters, fetch profiles
//! - [`sql`] - SQL AST and renderer
//! - [`dialect`] - Backend-specific lock and limit syntax
//! - [`translate`] - Criteria and id-load translation, lock planning
//! - [`exec`] - List, scroll and stream execution
//! - [`results`] - Result set mappings, row decoding, transformers
//! - [`cache`] - Query results regions and compiled statement caches
//! - [`loader`] - Single-id entity loader
//! - [`engine`] - Entry point tying the above together

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod exec;
pub mod loader;
pub mod named;
pub mod results;
pub mod session;
pub mod sql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod translate;

pub use cache::{QueryCacheRegistry, QueryKey, QueryResultsCache, UpdateTimestamps};
pub use catalog::{Catalog, EntityDef, RelationDef, SchemaBundle};
pub use config::EngineConfig;
pub use dialect::{dialect_for_name, Dialect};
pub use engine::Engine;
pub use error::{Error, TranslationError};
pub use exec::{
    CompiledSelect, Connection, ExecutionContext, ResultStream, ScrollableResults, SelectExecutor,
};
pub use loader::SingleIdEntityLoader;
pub use named::NamedQueryRegistry;
pub use results::{
    AliasToMap, DistinctRootEntity, EntityInstance, ResultValue, RootEntity, RowTransformer,
    SingularReturn, TupleTransformer,
};
pub use session::Session;
pub use translate::{CriteriaTranslator, LoadQueryInfluencers};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;

/// Re-export query specification types.
pub use relmap_proto as proto;
