//! Pessimistic and optimistic lock requests.
//!
//! A query carries one [`LockOptions`]: a default [`LockMode`] plus optional
//! per-alias overrides, a wait timeout, and an explicit follow-on locking
//! preference. Lock modes form a total order so that merging several alias
//! requests always resolves to a single, most restrictive mode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Requested row lock, ordered from least to most restrictive.
///
/// The derived `Ord` follows declaration order; [`LockMode::greater_than`]
/// and [`LockOptions::find_greatest_lock_mode`] rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// No lock.
    #[default]
    None,
    /// Shared read, satisfied by version check at the end of the transaction.
    Read,
    /// Optimistic version check.
    Optimistic,
    /// Optimistic with a forced version increment.
    OptimisticForceIncrement,
    /// `select ... for update`.
    Upgrade,
    /// `select ... for update nowait`.
    UpgradeNowait,
    /// `select ... for update skip locked`.
    UpgradeSkipLocked,
    /// Forced version increment under an upgrade lock.
    Force,
    /// Pessimistic shared lock.
    PessimisticRead,
    /// Pessimistic exclusive lock.
    PessimisticWrite,
    /// Pessimistic exclusive lock with a forced version increment.
    PessimisticForceIncrement,
}

impl LockMode {
    /// Whether `self` is strictly more restrictive than `other`.
    pub fn greater_than(self, other: LockMode) -> bool {
        self > other
    }

    /// Whether `self` is strictly less restrictive than `other`.
    pub fn less_than(self, other: LockMode) -> bool {
        self < other
    }

    /// Name used in logs and external configuration.
    pub fn name(&self) -> &'static str {
        match self {
            LockMode::None => "none",
            LockMode::Read => "read",
            LockMode::Optimistic => "optimistic",
            LockMode::OptimisticForceIncrement => "optimistic_force_increment",
            LockMode::Upgrade => "upgrade",
            LockMode::UpgradeNowait => "upgrade_nowait",
            LockMode::UpgradeSkipLocked => "upgrade_skiplocked",
            LockMode::Force => "force",
            LockMode::PessimisticRead => "pessimistic_read",
            LockMode::PessimisticWrite => "pessimistic_write",
            LockMode::PessimisticForceIncrement => "pessimistic_force_increment",
        }
    }

    /// Parse a lock mode name as produced by [`LockMode::name`].
    pub fn from_name(name: &str) -> Option<LockMode> {
        let mode = match name.trim().to_ascii_lowercase().as_str() {
            "none" => LockMode::None,
            "read" => LockMode::Read,
            "optimistic" => LockMode::Optimistic,
            "optimistic_force_increment" => LockMode::OptimisticForceIncrement,
            "upgrade" => LockMode::Upgrade,
            "upgrade_nowait" => LockMode::UpgradeNowait,
            "upgrade_skiplocked" => LockMode::UpgradeSkipLocked,
            "force" => LockMode::Force,
            "pessimistic_read" => LockMode::PessimisticRead,
            "pessimistic_write" => LockMode::PessimisticWrite,
            "pessimistic_force_increment" => LockMode::PessimisticForceIncrement,
            _ => return None,
        };
        Some(mode)
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How long lock acquisition may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LockTimeout {
    /// No explicit timeout was requested; the dialect default applies.
    #[default]
    Default,
    /// Wait indefinitely.
    WaitForever,
    /// Fail immediately if the row is locked.
    NoWait,
    /// Skip rows that are locked.
    SkipLocked,
    /// Wait at most this many milliseconds.
    Millis(u32),
}

/// Lock request for one query execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockOptions {
    /// Lock mode applied to aliases without an override.
    pub lock_mode: LockMode,
    /// Per-alias overrides, keyed by query alias.
    #[serde(default)]
    pub alias_lock_modes: BTreeMap<String, LockMode>,
    /// Wait timeout.
    #[serde(default)]
    pub timeout: LockTimeout,
    /// Extend the lock to associated collection and element tables.
    #[serde(default)]
    pub scope: bool,
    /// Explicit follow-on locking request; `None` defers to the dialect.
    #[serde(default)]
    pub follow_on_locking: Option<bool>,
}

impl LockOptions {
    /// Options requesting no lock.
    pub fn none() -> Self {
        Self::default()
    }

    /// Options requesting `mode` for every alias.
    pub fn new(mode: LockMode) -> Self {
        Self {
            lock_mode: mode,
            ..Self::default()
        }
    }

    /// Shorthand for [`LockMode::Read`].
    pub fn read() -> Self {
        Self::new(LockMode::Read)
    }

    /// Shorthand for [`LockMode::Upgrade`].
    pub fn upgrade() -> Self {
        Self::new(LockMode::Upgrade)
    }

    /// Override the lock mode for a single alias.
    pub fn with_alias_lock_mode(mut self, alias: impl Into<String>, mode: LockMode) -> Self {
        self.alias_lock_modes.insert(alias.into(), mode);
        self
    }

    /// Set the wait timeout.
    pub fn with_timeout(mut self, timeout: LockTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extend the lock scope.
    pub fn with_scope(mut self, scope: bool) -> Self {
        self.scope = scope;
        self
    }

    /// Force follow-on locking on or off regardless of the dialect's preference.
    pub fn with_follow_on_locking(mut self, follow_on: bool) -> Self {
        self.follow_on_locking = Some(follow_on);
        self
    }

    /// Lock mode effective for `alias`: its override, else the default mode.
    pub fn effective_lock_mode(&self, alias: &str) -> LockMode {
        self.alias_lock_modes
            .get(alias)
            .copied()
            .unwrap_or(self.lock_mode)
    }

    /// Number of alias-specific overrides.
    pub fn alias_lock_count(&self) -> usize {
        self.alias_lock_modes.len()
    }

    /// Whether any alias-specific override is present.
    pub fn has_alias_specific_lock_modes(&self) -> bool {
        !self.alias_lock_modes.is_empty()
    }

    /// The most restrictive mode among the default mode and every override.
    pub fn find_greatest_lock_mode(&self) -> LockMode {
        self.alias_lock_modes
            .values()
            .copied()
            .fold(self.lock_mode, |greatest, mode| {
                if mode.greater_than(greatest) {
                    mode
                } else {
                    greatest
                }
            })
    }

    /// Whether no lock is requested anywhere.
    pub fn is_none(&self) -> bool {
        self.find_greatest_lock_mode() == LockMode::None
    }
}
