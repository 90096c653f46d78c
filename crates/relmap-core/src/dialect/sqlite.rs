use super::Dialect;
use crate::sql::LockClause;
use relmap_proto::{LockMode, LockTimeout, RowSelection};

/// SQLite. Locking is database-wide, so row lock clauses are never emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn lock_string(&self, _mode: LockMode, _timeout: LockTimeout, _aliases: Option<&str>) -> String {
        String::new()
    }

    fn apply_locks_to_sql(&self, sql: &str, _clause: &LockClause) -> String {
        sql.to_string()
    }

    fn apply_limit(&self, sql: &str, selection: &RowSelection) -> String {
        if !selection.defines_limits() {
            return sql.to_string();
        }
        let limit = selection
            .max_rows
            .filter(|_| selection.has_max_rows())
            .map_or(-1, i64::from);
        let mut out = format!("{} limit {}", sql, limit);
        if selection.has_first_row() {
            out.push_str(&format!(" offset {}", selection.first_row.unwrap_or(0)));
        }
        out
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }
}
