//! Row transformers.
//!
//! A transformer turns the included results of one row into the caller's row
//! type, and may reshape the whole list once every row is read. Transformers
//! see decoded values only, so the same transformer behaves identically for
//! live and cached rows.

use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;

use super::row::ResultValue;
use crate::error::Error;

/// Shapes decoded rows for the caller.
pub trait RowTransformer<R>: Send + Sync {
    /// Build one caller row from the included results and their aliases.
    fn transform_row(&self, row: Vec<ResultValue>, aliases: &[Option<String>]) -> Result<R, Error>;

    /// Reshape the complete list; identity by default.
    fn transform_list(&self, rows: Vec<R>) -> Vec<R> {
        rows
    }
}

/// Returns every row as the full result tuple.
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleTransformer;

impl RowTransformer<Vec<ResultValue>> for TupleTransformer {
    fn transform_row(
        &self,
        row: Vec<ResultValue>,
        _aliases: &[Option<String>],
    ) -> Result<Vec<ResultValue>, Error> {
        Ok(row)
    }
}

/// Returns the only result of each row.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingularReturn;

impl RowTransformer<ResultValue> for SingularReturn {
    fn transform_row(&self, mut row: Vec<ResultValue>, _aliases: &[Option<String>]) -> Result<ResultValue, Error> {
        if row.len() != 1 {
            return Err(Error::ResultShape(format!(
                "expected a single result per row, found {}",
                row.len()
            )));
        }
        Ok(row.remove(0))
    }
}

/// Returns the root entity, which is the last result of an entity row.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootEntity;

impl RowTransformer<ResultValue> for RootEntity {
    fn transform_row(&self, mut row: Vec<ResultValue>, _aliases: &[Option<String>]) -> Result<ResultValue, Error> {
        row.pop()
            .ok_or_else(|| Error::ResultShape("row has no results".to_string()))
    }
}

/// Like [`RootEntity`], keeping only the first occurrence of each entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistinctRootEntity;

impl RowTransformer<ResultValue> for DistinctRootEntity {
    fn transform_row(&self, row: Vec<ResultValue>, aliases: &[Option<String>]) -> Result<ResultValue, Error> {
        RootEntity.transform_row(row, aliases)
    }

    fn transform_list(&self, rows: Vec<ResultValue>) -> Vec<ResultValue> {
        let mut seen = HashSet::with_capacity(rows.len());
        rows.into_iter()
            .filter(|row| seen.insert(row.identity_key()))
            .collect()
    }
}

/// Returns each row as a map from alias to result; unaliased results are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AliasToMap;

impl RowTransformer<BTreeMap<String, ResultValue>> for AliasToMap {
    fn transform_row(
        &self,
        row: Vec<ResultValue>,
        aliases: &[Option<String>],
    ) -> Result<BTreeMap<String, ResultValue>, Error> {
        if row.len() != aliases.len() {
            return Err(Error::ResultShape(format!(
                "{} results but {} aliases",
                row.len(),
                aliases.len()
            )));
        }
        Ok(row
            .into_iter()
            .zip(aliases)
            .filter_map(|(value, alias)| alias.clone().map(|alias| (alias, value)))
            .collect())
    }
}

/// Adapts a closure into a transformer.
pub struct FnRowTransformer<R, F> {
    f: F,
    _row: PhantomData<fn() -> R>,
}

impl<R, F> FnRowTransformer<R, F>
where
    F: Fn(Vec<ResultValue>, &[Option<String>]) -> Result<R, Error> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _row: PhantomData,
        }
    }
}

impl<R, F> RowTransformer<R> for FnRowTransformer<R, F>
where
    F: Fn(Vec<ResultValue>, &[Option<String>]) -> Result<R, Error> + Send + Sync,
{
    fn transform_row(&self, row: Vec<ResultValue>, aliases: &[Option<String>]) -> Result<R, Error> {
        (self.f)(row, aliases)
    }
}
