//! Core error types.

use thiserror::Error;

use crate::exec::jdbc::SqlError;
use relmap_proto::LockMode;

/// Errors raised while compiling a query into an SQL AST.
///
/// These are reported before any SQL is issued and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// The root entity is not mapped.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A path references an alias that is neither the root nor a declared join.
    #[error("unknown alias: {0}")]
    UnknownAlias(String),

    /// An alias was declared twice.
    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),

    /// A path references a property the entity does not map.
    #[error("entity {entity} has no property '{property}'")]
    UnknownProperty { entity: String, property: String },

    /// A join references an association the entity does not map.
    #[error("entity {entity} has no association '{association}'")]
    UnknownAssociation { entity: String, association: String },

    /// The association cannot be joined.
    #[error("unsupported join: {0}")]
    UnsupportedJoin(String),

    /// The projection cannot be expressed for the referenced property.
    #[error("unsupported projection: {0}")]
    UnsupportedProjection(String),

    /// The predicate is structurally invalid.
    #[error("malformed predicate: {0}")]
    MalformedPredicate(String),

    /// Operands of a comparison span a different number of columns.
    #[error("column span mismatch: expected {expected}, found {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A session filter is enabled but a parameter it needs is not set.
    #[error("filter '{filter}' is missing parameter '{parameter}'")]
    MissingFilterParameter { filter: String, parameter: String },

    /// A fetch profile enabled on the session is not mapped.
    #[error("unknown fetch profile: {0}")]
    UnknownFetchProfile(String),
}

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Query translation failed.
    #[error("translation error: {0}")]
    Translation(#[from] TranslationError),

    /// The backend failed to prepare, bind, execute or fetch.
    #[error("{message} [{sql}]: {source}")]
    Jdbc {
        message: String,
        sql: String,
        #[source]
        source: SqlError,
    },

    /// Reading rows failed; carries the statement that produced them.
    #[error("error processing return rows [{sql}]: {source}")]
    RowProcessing {
        sql: String,
        #[source]
        source: Box<Error>,
    },

    /// A value could not be decoded into its declared shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// A parameter value could not be bound.
    #[error("binding error: {0}")]
    Binding(String),

    /// A row did not match the result set mapping.
    #[error("result shape mismatch: {0}")]
    ResultShape(String),

    /// The entity is not mapped.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The mapping metadata is inconsistent.
    #[error("invalid mapping: {0}")]
    Mapping(String),

    /// A follow-on lock found no row to lock.
    #[error("could not acquire {lock_mode} lock on {entity}")]
    LockAcquisition { entity: String, lock_mode: LockMode },

    /// The cursor or stream was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// The operation is not supported by this cursor or backend.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The query results cache failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// No named query is registered under this name.
    #[error("unknown named query: {0}")]
    UnknownNamedQuery(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] relmap_proto::Error),
}

impl Error {
    /// Wrap a backend error with the SQL it concerned.
    pub fn jdbc(message: impl Into<String>, sql: impl Into<String>, source: SqlError) -> Self {
        Error::Jdbc {
            message: message.into(),
            sql: sql.into(),
            source,
        }
    }

    /// Attach the SQL whose rows were being processed. Backend errors already
    /// carry their SQL and are returned as is.
    pub fn row_processing(sql: impl Into<String>, error: Error) -> Self {
        match error {
            e @ (Error::Jdbc { .. } | Error::RowProcessing { .. } | Error::Closed(_)) => e,
            other => Error::RowProcessing {
                sql: sql.into(),
                source: Box::new(other),
            },
        }
    }

    /// The SQL text attached to this error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Jdbc { sql, .. } | Error::RowProcessing { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The innermost error, looking through row-processing wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::RowProcessing { source, .. } => source.root(),
            other => other,
        }
    }
}
