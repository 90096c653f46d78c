//! SQL dialects.
//!
//! A dialect decides how lock clauses and row limits are written for a
//! backend, and whether locking has to be deferred to follow-on statements.
//! Everything else about the generated SQL is dialect-neutral.

mod oracle;
mod postgres;
mod sqlite;

pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use tracing::warn;

use crate::sql::LockClause;
use relmap_proto::{LockMode, LockTimeout, RowSelection};

/// Backend-specific SQL generation policy.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Dialect name, for logs.
    fn name(&self) -> &'static str;

    /// The bare `for update` keyword sequence, with its leading space.
    fn for_update_string(&self) -> &'static str {
        " for update"
    }

    /// `for update`, restricted to `aliases` when given.
    fn for_update_of_string(&self, aliases: Option<&str>) -> String {
        match aliases {
            Some(aliases) if !aliases.is_empty() => {
                format!("{} of {}", self.for_update_string(), aliases)
            }
            _ => self.for_update_string().to_string(),
        }
    }

    /// `for update ... nowait`.
    fn for_update_nowait_string(&self, aliases: Option<&str>) -> String {
        format!("{} nowait", self.for_update_of_string(aliases))
    }

    /// `for update ... skip locked`.
    fn for_update_skip_locked_string(&self, aliases: Option<&str>) -> String {
        format!("{} skip locked", self.for_update_of_string(aliases))
    }

    /// Lock fragment honoring the wait timeout.
    fn for_update_fragment(&self, aliases: Option<&str>, timeout: LockTimeout) -> String {
        match timeout {
            LockTimeout::NoWait => self.for_update_nowait_string(aliases),
            LockTimeout::SkipLocked => self.for_update_skip_locked_string(aliases),
            _ => self.for_update_of_string(aliases),
        }
    }

    /// Shared lock fragment.
    fn read_lock_string(&self, aliases: Option<&str>, timeout: LockTimeout) -> String {
        self.for_update_fragment(aliases, timeout)
    }

    /// Exclusive lock fragment.
    fn write_lock_string(&self, aliases: Option<&str>, timeout: LockTimeout) -> String {
        if timeout == LockTimeout::SkipLocked {
            return self.for_update_skip_locked_string(aliases);
        }
        self.for_update_fragment(aliases, timeout)
    }

    /// Lock fragment for `mode`; empty for modes that take no row lock.
    fn lock_string(&self, mode: LockMode, timeout: LockTimeout, aliases: Option<&str>) -> String {
        match mode {
            LockMode::Upgrade => self.for_update_of_string(aliases),
            LockMode::PessimisticRead => self.read_lock_string(aliases, timeout),
            LockMode::PessimisticWrite => self.write_lock_string(aliases, timeout),
            LockMode::UpgradeNowait | LockMode::Force | LockMode::PessimisticForceIncrement => {
                self.for_update_nowait_string(aliases)
            }
            LockMode::UpgradeSkipLocked => self.for_update_skip_locked_string(aliases),
            _ => String::new(),
        }
    }

    /// Whether locks for this row selection must be acquired by follow-on statements.
    fn use_follow_on_locking(&self, _selection: &RowSelection) -> bool {
        false
    }

    /// Whether `for update of alias.column` is supported.
    fn supports_lock_of_columns(&self) -> bool {
        false
    }

    /// Append the lock clause to a rendered select.
    fn apply_locks_to_sql(&self, sql: &str, clause: &LockClause) -> String {
        if clause.lock_mode == LockMode::None {
            return sql.to_string();
        }
        let aliases = if clause.all_tables {
            None
        } else if self.supports_lock_of_columns() {
            Some(clause.key_column_list())
        } else {
            warn!(
                dialect = self.name(),
                "Dialect cannot lock a subset of tables, locking every table"
            );
            None
        };
        format!(
            "{}{}",
            sql,
            self.lock_string(clause.lock_mode, clause.timeout, aliases.as_deref())
        )
    }

    /// Append offset and limit.
    fn apply_limit(&self, sql: &str, selection: &RowSelection) -> String {
        let mut out = sql.to_string();
        if selection.has_first_row() {
            out.push_str(&format!(" offset {} rows", selection.first_row.unwrap_or(0)));
        }
        if let Some(max) = selection.max_rows.filter(|_| selection.has_max_rows()) {
            out.push_str(&format!(" fetch first {} rows only", max));
        }
        out
    }

    /// Literal for a boolean in a truth-value check.
    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }
}

/// SQL:2008 standard dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }
}

/// Resolve a dialect by name, as used in configuration.
pub fn dialect_for_name(name: &str) -> Option<std::sync::Arc<dyn Dialect>> {
    let dialect: std::sync::Arc<dyn Dialect> = match name.trim().to_ascii_lowercase().as_str() {
        "ansi" => std::sync::Arc::new(AnsiDialect),
        "oracle" => std::sync::Arc::new(OracleDialect),
        "postgres" | "postgresql" => std::sync::Arc::new(PostgresDialect),
        "sqlite" => std::sync::Arc::new(SqliteDialect),
        _ => return None,
    };
    Some(dialect)
}
