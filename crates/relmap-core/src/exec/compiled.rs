//! Compiled statements and their parameter bindings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::Error;
use crate::results::ResultSetMapping;
use crate::sql::{ParameterId, ParameterSlot};
use crate::translate::FollowOnLock;
use relmap_proto::Value;

/// Values bound to logical parameters for one execution.
///
/// A composite parameter holds one value per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JdbcParameterBindings {
    values: BTreeMap<ParameterId, Vec<Value>>,
}

impl JdbcParameterBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every component of parameter `id`.
    pub fn bind(&mut self, id: ParameterId, values: Vec<Value>) {
        self.values.insert(id, values);
    }

    /// Bind a single-column parameter.
    pub fn bind_value(&mut self, id: ParameterId, value: Value) {
        self.values.insert(id, vec![value]);
    }

    pub fn get(&self, id: ParameterId) -> Option<&[Value]> {
        self.values.get(&id).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of these bindings with `other` layered on top.
    pub fn merged_with(&self, other: &JdbcParameterBindings) -> Self {
        let mut merged = self.clone();
        for (id, values) in &other.values {
            merged.values.insert(*id, values.clone());
        }
        merged
    }

    /// The value bound to one placeholder.
    pub fn value_for(&self, slot: &ParameterSlot) -> Result<&Value, Error> {
        self.values
            .get(&slot.id)
            .and_then(|values| values.get(slot.component))
            .ok_or_else(|| {
                Error::Binding(format!(
                    "no value bound for parameter {} component {}",
                    slot.id, slot.component
                ))
            })
    }

    /// Values in placeholder order, as they are sent to the backend.
    pub fn ordered_values(&self, slots: &[ParameterSlot]) -> Result<Vec<Value>, Error> {
        slots
            .iter()
            .map(|slot| self.value_for(slot).cloned())
            .collect()
    }
}

/// A translated and rendered select, ready to execute any number of times.
#[derive(Debug, Clone)]
pub struct CompiledSelect {
    pub sql: String,
    /// Placeholders in SQL order.
    pub parameters: Vec<ParameterSlot>,
    pub mapping: Arc<ResultSetMapping>,
    /// Tables whose modification invalidates cached results of this select.
    pub affected_table_names: BTreeSet<String>,
    pub follow_on: Option<Arc<FollowOnLock>>,
    /// Values known when the query was translated.
    pub bindings: JdbcParameterBindings,
}

impl CompiledSelect {
    /// Whether the select fetches collections and rows must be merged per entity.
    pub fn fetches_collections(&self) -> bool {
        self.mapping.contains_collection_fetches()
    }
}
