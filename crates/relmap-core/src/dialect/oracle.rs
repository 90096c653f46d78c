use super::Dialect;
use relmap_proto::{LockTimeout, RowSelection};

/// Oracle 12c and later.
///
/// Oracle rejects `for update` together with row limiting, so any limited
/// selection is locked with follow-on statements instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn for_update_fragment(&self, aliases: Option<&str>, timeout: LockTimeout) -> String {
        match timeout {
            LockTimeout::NoWait => self.for_update_nowait_string(aliases),
            LockTimeout::SkipLocked => self.for_update_skip_locked_string(aliases),
            LockTimeout::Millis(ms) if ms > 0 => {
                // Oracle waits whole seconds and `wait 0` means nowait.
                let secs = ((f64::from(ms) / 1000.0).round() as u64).max(1);
                format!("{} wait {}", self.for_update_of_string(aliases), secs)
            }
            _ => self.for_update_of_string(aliases),
        }
    }

    fn use_follow_on_locking(&self, selection: &RowSelection) -> bool {
        selection.defines_limits()
    }

    fn supports_lock_of_columns(&self) -> bool {
        true
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }
}
