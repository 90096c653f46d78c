//! Query results cache keys.

use serde::Serialize;

use crate::error::Error;
use relmap_proto::{RowSelection, Value};

/// Identifies one cached result: the SQL, its parameter values, the row
/// window and the tenant.
///
/// Parameter values are reduced to a blake3 digest of their canonical
/// encoding, so keys stay small regardless of how many values are bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryKey {
    pub sql: String,
    pub first_row: Option<u32>,
    pub max_rows: Option<u32>,
    /// Hex-encoded digest of the bound values in placeholder order.
    pub parameters_digest: String,
    pub tenant: Option<String>,
}

impl QueryKey {
    /// Build the key for `sql` executed with `parameters` over `selection`.
    pub fn new(
        sql: impl Into<String>,
        selection: &RowSelection,
        parameters: &[Value],
        tenant: Option<&str>,
    ) -> Result<Self, Error> {
        let encoded = serde_json::to_vec(parameters)
            .map_err(|e| Error::Cache(format!("could not encode query parameters: {e}")))?;
        Ok(Self {
            sql: sql.into(),
            first_row: selection.first_row,
            max_rows: selection.max_rows,
            parameters_digest: hex::encode(blake3::hash(&encoded).as_bytes()),
            tenant: tenant.map(str::to_string),
        })
    }
}
