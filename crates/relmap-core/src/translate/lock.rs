//! Lock clause planning.
//!
//! [`plan_locking`] decides, for one query, whether row locks are embedded
//! into the primary select or deferred to follow-on statements run after the
//! rows are materialized.

use tracing::warn;

use crate::dialect::Dialect;
use crate::sql::{LockClause, LockedTable, ParameterSlot, SqlSelection};
use relmap_proto::{LockMode, LockOptions, LockTimeout, RowSelection};

/// A table alias that can be locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockableAlias {
    /// Query alias.
    pub alias: String,
    pub sql_alias: String,
    /// Identifier columns, used for `for update of`.
    pub key_columns: Vec<String>,
}

/// Outcome of lock planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStrategy {
    /// No row lock is taken.
    None,
    /// The lock clause is part of the primary select.
    Embedded(LockClause),
    /// The primary select runs unlocked; the listed aliases are locked afterwards.
    FollowOn {
        lock_mode: LockMode,
        timeout: LockTimeout,
        aliases: Vec<String>,
    },
}

/// Whether `mode` is enforced by a row lock rather than a version check.
pub fn requires_row_lock(mode: LockMode) -> bool {
    mode >= LockMode::Upgrade
}

/// Decide how the locks requested by `options` are applied.
///
/// Every alias is locked with the highest mode requested for any alias.
/// Follow-on locking is used when the options ask for it, else when
/// `follow_on_default` does, else when the dialect requires it for this row
/// selection. `UpgradeSkipLocked` is always embedded: skipping locked rows
/// only has meaning inside the statement that reads them.
pub fn plan_locking(
    options: &LockOptions,
    aliases: &[LockableAlias],
    dialect: &dyn Dialect,
    selection: &RowSelection,
    follow_on_default: Option<bool>,
) -> LockStrategy {
    let lock_mode = options.find_greatest_lock_mode();
    if !requires_row_lock(lock_mode) {
        return LockStrategy::None;
    }

    let locked: Vec<&LockableAlias> = aliases
        .iter()
        .filter(|a| requires_row_lock(options.effective_lock_mode(&a.alias)))
        .collect();
    if locked.is_empty() {
        return LockStrategy::None;
    }

    if options.alias_lock_count() > 1 {
        warn!(
            aliases = options.alias_lock_count(),
            lock_mode = %lock_mode,
            "Alias-specific lock modes requested, using the highest mode for every locked alias"
        );
    }

    let follow_on = options
        .follow_on_locking
        .or(follow_on_default)
        .unwrap_or_else(|| dialect.use_follow_on_locking(selection));

    if follow_on && lock_mode != LockMode::UpgradeSkipLocked {
        return LockStrategy::FollowOn {
            lock_mode,
            timeout: options.timeout,
            aliases: locked.iter().map(|a| a.alias.clone()).collect(),
        };
    }

    LockStrategy::Embedded(LockClause {
        lock_mode,
        timeout: options.timeout,
        all_tables: locked.len() == aliases.len(),
        locked: locked
            .into_iter()
            .map(|a| LockedTable {
                sql_alias: a.sql_alias.clone(),
                key_columns: a.key_columns.clone(),
            })
            .collect(),
    })
}

/// One entity locked after the primary select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowOnTarget {
    pub alias: String,
    pub entity: String,
    /// Position of the entity's identifier in the primary row.
    pub id: SqlSelection,
    /// `select id ... where id = ? for update` for this entity.
    pub lock_sql: String,
    pub parameters: Vec<ParameterSlot>,
}

/// Locks deferred until the primary rows are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowOnLock {
    pub lock_mode: LockMode,
    pub timeout: LockTimeout,
    pub targets: Vec<FollowOnTarget>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{AnsiDialect, OracleDialect};
    use pretty_assertions::assert_eq;

    fn aliases() -> Vec<LockableAlias> {
        vec![
            LockableAlias {
                alias: "this".into(),
                sql_alias: "this_".into(),
                key_columns: vec!["id".into()],
            },
            LockableAlias {
                alias: "c".into(),
                sql_alias: "c_".into(),
                key_columns: vec!["id".into()],
            },
        ]
    }

    #[test]
    fn test_no_lock() {
        let strategy = plan_locking(
            &LockOptions::none(),
            &aliases(),
            &AnsiDialect,
            &RowSelection::none(),
            None,
        );
        assert_eq!(strategy, LockStrategy::None);

        let read = plan_locking(&LockOptions::read(), &aliases(), &AnsiDialect, &RowSelection::none(), None);
        assert_eq!(read, LockStrategy::None);
    }

    #[test]
    fn test_embedded_all_tables() {
        let options = LockOptions::new(LockMode::PessimisticWrite);
        match plan_locking(&options, &aliases(), &AnsiDialect, &RowSelection::none(), None) {
            LockStrategy::Embedded(clause) => {
                assert!(clause.all_tables);
                assert_eq!(clause.lock_mode, LockMode::PessimisticWrite);
                assert_eq!(clause.locked.len(), 2);
            }
            other => panic!("expected embedded lock, got {other:?}"),
        }
    }

    #[test]
    fn test_embedded_subset_uses_highest_mode() {
        let options = LockOptions::none()
            .with_alias_lock_mode("c", LockMode::PessimisticRead)
            .with_alias_lock_mode("this", LockMode::Read);
        match plan_locking(&options, &aliases(), &OracleDialect, &RowSelection::none(), None) {
            LockStrategy::Embedded(clause) => {
                assert!(!clause.all_tables);
                assert_eq!(clause.lock_mode, LockMode::PessimisticRead);
                assert_eq!(clause.key_column_list(), "c_.id");
            }
            other => panic!("expected embedded lock, got {other:?}"),
        }
    }

    #[test]
    fn test_follow_on_when_dialect_requires_it() {
        let options = LockOptions::none().with_alias_lock_mode("c", LockMode::PessimisticWrite);
        let strategy = plan_locking(&options, &aliases(), &OracleDialect, &RowSelection::limit(10), None);
        assert_eq!(
            strategy,
            LockStrategy::FollowOn {
                lock_mode: LockMode::PessimisticWrite,
                timeout: LockTimeout::Default,
                aliases: vec!["c".into()],
            }
        );
    }

    #[test]
    fn test_explicit_flag_overrides_dialect() {
        let options = LockOptions::upgrade().with_follow_on_locking(false);
        assert!(matches!(
            plan_locking(&options, &aliases(), &OracleDialect, &RowSelection::limit(10), None),
            LockStrategy::Embedded(_)
        ));

        let forced = LockOptions::upgrade();
        assert!(matches!(
            plan_locking(&forced, &aliases(), &AnsiDialect, &RowSelection::none(), Some(true)),
            LockStrategy::FollowOn { .. }
        ));
    }

    #[test]
    fn test_skip_locked_is_never_deferred() {
        let options = LockOptions::new(LockMode::UpgradeSkipLocked).with_follow_on_locking(true);
        assert!(matches!(
            plan_locking(&options, &aliases(), &OracleDialect, &RowSelection::limit(5), None),
            LockStrategy::Embedded(_)
        ));
    }
}
