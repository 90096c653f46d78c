//! Statement execution.
//!
//! A [`CompiledSelect`] is executed by the [`SelectExecutor`] in one of
//! three ways: `list` materializes every row, `scroll` returns a navigable
//! [`ScrollableResults`], and `stream` returns a lazy [`ResultStream`].
//! The backend is reached only through the traits in [`jdbc`].

mod compiled;
mod context;
mod cursor;
mod executor;
mod follow_on;
pub mod jdbc;
mod scroll;
mod values;

pub use compiled::{CompiledSelect, JdbcParameterBindings};
pub use context::ExecutionContext;
pub use executor::SelectExecutor;
pub use jdbc::{
    ColumnMetadata, Connection, Holdability, PreparedStatement, ResultSet, ResultSetMetadata,
    SqlError, StatementOptions,
};
pub use scroll::{ResultStream, ScrollableResults};
