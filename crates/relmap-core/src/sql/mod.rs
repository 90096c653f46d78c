//! SQL AST.
//!
//! The translator builds a [`SelectStatement`] out of typed expression and
//! predicate nodes; the [`SqlAstRenderer`] turns it into SQL text plus the
//! placeholder layout used for binding.

mod expression;
mod predicate;
mod render;
mod select;

pub use expression::{
    AggregateFunction, BinaryOperator, ColumnReference, ExpressableType, Expression,
    JdbcParameter, ParameterId, SqlSelection, SqlTuple, UnaryOperator,
};
pub use predicate::{JunctionKind, Predicate};
pub use render::{ParameterSlot, RenderedSql, SqlAstRenderer};
pub use select::{
    FromClause, LockClause, LockedTable, QuerySpec, SelectClause, SelectItem, SelectStatement,
    SortSpecification, TableGroup, TableGroupJoin, TableReference, TableSpace,
};
