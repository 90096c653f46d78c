//! Query specification types for relmap.
//!
//! This crate holds the plain data exchanged between callers and the engine:
//! criteria queries and their restriction and projection trees, lock and
//! cache options, named query descriptors, and the values bound to and read
//! from the relational backend.
//!
//! # Modules
//!
//! - [`value`] - Runtime column values
//! - [`types`] - JDBC-level column types
//! - [`criteria`] - Criteria queries, restrictions, projections
//! - [`lock`] - Lock modes and lock options
//! - [`options`] - Row selection, cache and scroll modes, query options
//! - [`named`] - Named query descriptors
//! - [`rows`] - Raw row sets held by result cache regions
//! - [`error`] - Protocol error types

pub mod criteria;
pub mod error;
pub mod lock;
pub mod named;
pub mod options;
pub mod rows;
pub mod types;
pub mod value;

pub use error::Error;

pub use criteria::{
    ArithmeticOp, ComparisonOp, Criteria, CriteriaJoin, JoinType, Order, Projection,
    ProjectionItem, Restriction, ROOT_ALIAS,
};
pub use lock::{LockMode, LockOptions, LockTimeout};
pub use named::NamedQueryDescriptor;
pub use options::{CacheMode, QueryOptions, RowSelection, ScrollMode};
pub use rows::CachedRows;
pub use types::SqlType;
pub use value::Value;

/// Parse a JSON array of named query descriptors.
pub fn named_queries_from_json(json: &str) -> Result<Vec<NamedQueryDescriptor>, Error> {
    Ok(serde_json::from_str(json)?)
}
