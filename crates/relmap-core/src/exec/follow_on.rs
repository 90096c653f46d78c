//! Follow-on lock execution.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::cursor::LiveCursor;
use super::jdbc::{Connection, StatementOptions};
use super::JdbcParameterBindings;
use crate::error::Error;
use crate::results::{value_keys, ValueKey};
use crate::translate::{FollowOnLock, FollowOnTarget, LOAD_ID_PARAMETER};
use relmap_proto::Value;

/// Locks the entities of primary rows after they are read, each entity once.
#[derive(Debug)]
pub(crate) struct FollowOnLocker {
    lock: Arc<FollowOnLock>,
    timeout_secs: Option<u32>,
    /// Target index and identifier of every entity locked so far.
    locked: HashSet<(usize, Vec<ValueKey>)>,
}

impl FollowOnLocker {
    pub(crate) fn new(lock: Arc<FollowOnLock>, timeout_secs: Option<u32>) -> Self {
        Self {
            lock,
            timeout_secs,
            locked: HashSet::new(),
        }
    }

    /// Lock every target entity referenced by `row` that is not locked yet.
    ///
    /// Targets whose identifier is null in this row (unmatched outer joins)
    /// are skipped.
    pub(crate) fn lock_row(&mut self, connection: &dyn Connection, row: &[Value]) -> Result<(), Error> {
        for (index, target) in self.lock.targets.iter().enumerate() {
            let start = target.id.values_array_position();
            let id = row.get(start..start + target.id.span()).ok_or_else(|| {
                Error::ResultShape(format!(
                    "row of {} columns has no identifier for alias '{}'",
                    row.len(),
                    target.alias
                ))
            })?;
            if id.iter().all(Value::is_null) {
                continue;
            }
            let key = (index, value_keys(id));
            if self.locked.contains(&key) {
                continue;
            }
            self.lock_entity(connection, target, id)?;
            self.locked.insert(key);
        }
        Ok(())
    }

    /// Lock every entity referenced by `rows`.
    pub(crate) fn lock_rows(&mut self, connection: &dyn Connection, rows: &[Vec<Value>]) -> Result<(), Error> {
        for row in rows {
            self.lock_row(connection, row)?;
        }
        Ok(())
    }

    fn lock_entity(
        &self,
        connection: &dyn Connection,
        target: &FollowOnTarget,
        id: &[Value],
    ) -> Result<(), Error> {
        let mut bindings = JdbcParameterBindings::new();
        bindings.bind(LOAD_ID_PARAMETER, id.to_vec());

        let options = StatementOptions::default().with_timeout_secs(self.timeout_secs);
        let mut cursor = LiveCursor::prepare(connection, &target.lock_sql, &options)?;
        cursor.bind(&target.parameters, &bindings)?;
        cursor.execute(None)?;
        let found = cursor.next()?;
        cursor.close()?;
        if !found {
            return Err(Error::LockAcquisition {
                entity: target.entity.clone(),
                lock_mode: self.lock.lock_mode,
            });
        }
        debug!(
            entity = %target.entity,
            alias = %target.alias,
            lock_mode = %self.lock.lock_mode,
            "Acquired follow-on lock"
        );
        Ok(())
    }
}
