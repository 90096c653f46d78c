use super::Dialect;
use relmap_proto::{LockTimeout, RowSelection};

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn read_lock_string(&self, aliases: Option<&str>, timeout: LockTimeout) -> String {
        let mut fragment = match aliases {
            Some(aliases) if !aliases.is_empty() => format!(" for share of {}", aliases),
            _ => " for share".to_string(),
        };
        match timeout {
            LockTimeout::NoWait => fragment.push_str(" nowait"),
            LockTimeout::SkipLocked => fragment.push_str(" skip locked"),
            _ => {}
        }
        fragment
    }

    fn apply_limit(&self, sql: &str, selection: &RowSelection) -> String {
        let mut out = sql.to_string();
        if let Some(max) = selection.max_rows.filter(|_| selection.has_max_rows()) {
            out.push_str(&format!(" limit {}", max));
        }
        if selection.has_first_row() {
            out.push_str(&format!(" offset {}", selection.first_row.unwrap_or(0)));
        }
        out
    }
}
