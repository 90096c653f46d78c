//! Decoding of raw rows into results.

use std::sync::Arc;

use super::mapping::{EntityDescriptor, ResultDescriptor, ResultSetMapping};
use super::row::{merge_row, rows_share_identity, EntityInstance, Fetched, ResultValue};
use crate::error::Error;
use crate::sql::SqlSelection;
use relmap_proto::Value;

/// Reads raw JDBC rows according to a result set mapping.
#[derive(Debug, Clone)]
pub struct RowReader {
    mapping: Arc<ResultSetMapping>,
    user_aliases: Vec<Option<String>>,
}

impl RowReader {
    pub fn new(mapping: Arc<ResultSetMapping>) -> Self {
        let user_aliases = mapping.user_aliases();
        Self {
            mapping,
            user_aliases,
        }
    }

    pub fn mapping(&self) -> &ResultSetMapping {
        &self.mapping
    }

    /// Aliases of the included results, in order.
    pub fn user_aliases(&self) -> &[Option<String>] {
        &self.user_aliases
    }

    /// Decode every result of a row, in declaration order.
    pub fn read_row(&self, values: &[Value]) -> Result<Vec<ResultValue>, Error> {
        if values.len() != self.mapping.column_count {
            return Err(Error::ResultShape(format!(
                "row has {} values, mapping expects {}",
                values.len(),
                self.mapping.column_count
            )));
        }
        self.mapping
            .results
            .iter()
            .map(|result| read_descriptor(&result.descriptor, values))
            .collect()
    }

    /// Drop results not flagged for inclusion, keeping relative order.
    pub fn reduce(&self, row: Vec<ResultValue>) -> Vec<ResultValue> {
        row.into_iter()
            .zip(&self.mapping.results)
            .filter(|(_, result)| result.include_in_result)
            .map(|(value, _)| value)
            .collect()
    }
}

fn columns<'v>(values: &'v [Value], selection: &SqlSelection) -> Result<&'v [Value], Error> {
    let start = selection.values_array_position();
    values.get(start..start + selection.span()).ok_or_else(|| {
        Error::ResultShape(format!(
            "selection at position {} spanning {} columns is outside a row of {} values",
            selection.jdbc_position,
            selection.span(),
            values.len()
        ))
    })
}

fn read_descriptor(descriptor: &ResultDescriptor, values: &[Value]) -> Result<ResultValue, Error> {
    match descriptor {
        ResultDescriptor::Scalar {
            selection,
            converter,
        } => {
            let value = columns(values, selection)?[0].clone();
            Ok(ResultValue::Scalar(match converter {
                Some(converter) => converter.to_domain_value(value)?,
                None => value,
            }))
        }
        ResultDescriptor::Tuple { selection, .. } => {
            Ok(ResultValue::Composite(columns(values, selection)?.to_vec()))
        }
        ResultDescriptor::Entity(entity) => Ok(match read_entity(entity, values)? {
            Some(instance) => ResultValue::Entity(instance),
            None => ResultValue::Scalar(Value::Null),
        }),
    }
}

/// Assemble an entity; `None` when every identifier column is null, as for
/// an outer join without a match.
fn read_entity(descriptor: &EntityDescriptor, values: &[Value]) -> Result<Option<EntityInstance>, Error> {
    let id = columns(values, &descriptor.id)?;
    if id.iter().all(Value::is_null) {
        return Ok(None);
    }
    let mut instance = EntityInstance::new(descriptor.entity.clone(), id.to_vec());

    for attribute in &descriptor.attributes {
        let raw = columns(values, &attribute.selection)?;
        let value = if attribute.selection.span() > 1 {
            ResultValue::Composite(raw.to_vec())
        } else {
            let value = raw[0].clone();
            ResultValue::Scalar(match &attribute.converter {
                Some(converter) => converter.to_domain_value(value)?,
                None => value,
            })
        };
        instance.attributes.insert(attribute.name.clone(), value);
    }

    for fetch in &descriptor.fetches {
        let target = read_entity(&fetch.target, values)?;
        let state = if fetch.collection {
            Fetched::Many(target.into_iter().collect())
        } else {
            Fetched::One(target.map(Box::new))
        };
        instance.fetched.insert(fetch.association.clone(), state);
    }
    Ok(Some(instance))
}

/// Folds consecutive rows of the same entities into one row, so a
/// collection fetched through a join yields one result per owner.
#[derive(Debug, Default)]
pub struct FetchMerger {
    pending: Option<Vec<ResultValue>>,
}

impl FetchMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoded row; returns the previous logical row once it is complete.
    pub fn push(&mut self, row: Vec<ResultValue>) -> Option<Vec<ResultValue>> {
        if let Some(pending) = self.pending.as_mut() {
            if rows_share_identity(pending, &row) {
                merge_row(pending, row);
                return None;
            }
        }
        self.pending.replace(row)
    }

    /// The last logical row, once the source is exhausted.
    pub fn finish(&mut self) -> Option<Vec<ResultValue>> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
