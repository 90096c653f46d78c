//! Live statement and result set pair.

use tracing::{debug, warn};

use super::jdbc::{Connection, PreparedStatement, ResultSet, SqlError, StatementOptions};
use super::JdbcParameterBindings;
use crate::error::Error;
use crate::results::ResultSetMapping;
use crate::sql::ParameterSlot;
use relmap_proto::{SqlType, Value};

/// A prepared statement and, once executed, its result set.
///
/// Closing releases the result set, then the statement, each exactly once.
/// A cursor dropped without being closed is closed on drop.
pub(crate) struct LiveCursor {
    sql: String,
    statement: Option<Box<dyn PreparedStatement>>,
    result_set: Option<Box<dyn ResultSet>>,
    /// `None` where neither the mapping nor the metadata knows the type.
    column_types: Vec<Option<SqlType>>,
}

impl LiveCursor {
    /// Prepare `sql` on `connection`.
    pub(crate) fn prepare(
        connection: &dyn Connection,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Self, Error> {
        debug!(sql, scroll_mode = ?options.scroll_mode, "Preparing statement");
        let statement = connection
            .prepare_statement(sql, options)
            .map_err(|e| Error::jdbc("could not prepare statement", sql, e))?;
        Ok(Self {
            sql: sql.to_string(),
            statement: Some(statement),
            result_set: None,
            column_types: Vec::new(),
        })
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind every placeholder from `bindings`.
    ///
    /// The slot's declared type is used, else the value's own type; untyped
    /// nulls bind as varchar.
    pub(crate) fn bind(
        &mut self,
        slots: &[ParameterSlot],
        bindings: &JdbcParameterBindings,
    ) -> Result<(), Error> {
        let statement = self
            .statement
            .as_mut()
            .ok_or(Error::Closed("statement"))?;
        for (index, slot) in slots.iter().enumerate() {
            let value = bindings.value_for(slot)?;
            let sql_type = slot
                .sql_type
                .or_else(|| value.sql_type())
                .unwrap_or(SqlType::Varchar);
            statement
                .bind(index + 1, value, sql_type)
                .map_err(|e| Error::jdbc("could not bind parameter", &self.sql, e))?;
        }
        Ok(())
    }

    /// Execute and resolve the column types of `mapping` against the result
    /// set metadata. Without a mapping no values can be read.
    pub(crate) fn execute(&mut self, mapping: Option<&ResultSetMapping>) -> Result<(), Error> {
        let statement = self
            .statement
            .as_mut()
            .ok_or(Error::Closed("statement"))?;
        let result_set = statement
            .execute_query()
            .map_err(|e| Error::jdbc("could not execute query", &self.sql, e))?;
        let column_types = match mapping {
            Some(mapping) => mapping.resolve_column_types(result_set.metadata()),
            None => Ok(Vec::new()),
        };
        // Keep the result set so that it is closed even when resolution fails.
        self.result_set = Some(result_set);
        self.column_types = column_types.map_err(|e| Error::RowProcessing {
            sql: self.sql.clone(),
            source: Box::new(e),
        })?;
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.statement.is_none() && self.result_set.is_none()
    }

    fn navigate(
        &mut self,
        what: &str,
        op: impl FnOnce(&mut dyn ResultSet) -> Result<bool, SqlError>,
    ) -> Result<bool, Error> {
        match self.result_set.as_mut() {
            Some(result_set) => op(result_set.as_mut())
                .map_err(|e| Error::jdbc(format!("could not {what}"), &self.sql, e)),
            None => Ok(false),
        }
    }

    pub(crate) fn next(&mut self) -> Result<bool, Error> {
        self.navigate("advance result set", |rs| rs.next())
    }

    pub(crate) fn previous(&mut self) -> Result<bool, Error> {
        self.navigate("move to previous row", |rs| rs.previous())
    }

    pub(crate) fn first(&mut self) -> Result<bool, Error> {
        self.navigate("move to first row", |rs| rs.first())
    }

    pub(crate) fn last(&mut self) -> Result<bool, Error> {
        self.navigate("move to last row", |rs| rs.last())
    }

    pub(crate) fn absolute(&mut self, row: i64) -> Result<bool, Error> {
        self.navigate("position result set", |rs| rs.absolute(row))
    }

    pub(crate) fn row_number(&self) -> Result<Option<usize>, Error> {
        match self.result_set.as_ref() {
            Some(result_set) => result_set
                .row_number()
                .map_err(|e| Error::jdbc("could not read row number", &self.sql, e)),
            None => Ok(None),
        }
    }

    /// Raw values of the current row, one per column.
    pub(crate) fn current_row(&self) -> Result<Vec<Value>, Error> {
        let result_set = self.result_set.as_ref().ok_or(Error::Closed("result set"))?;
        self.column_types
            .iter()
            .enumerate()
            .map(|(index, sql_type)| match sql_type {
                Some(sql_type) => result_set
                    .get(index + 1, *sql_type)
                    .map_err(|e| Error::jdbc("could not read column value", &self.sql, e)),
                None => result_set.get_object(index + 1).map_err(|e| Error::RowProcessing {
                    sql: self.sql.clone(),
                    source: Box::new(Error::Decode(format!(
                        "could not determine how to read JDBC value at position {}: {e}",
                        index + 1
                    ))),
                }),
            })
            .collect()
    }

    /// Close the result set, then the statement. Closing again does nothing.
    pub(crate) fn close(&mut self) -> Result<(), Error> {
        let result_set = self.result_set.take().map(|mut rs| rs.close()).transpose();
        let statement = self.statement.take().map(|mut st| st.close()).transpose();
        result_set.map_err(|e| Error::jdbc("could not close result set", &self.sql, e))?;
        statement.map_err(|e| Error::jdbc("could not close statement", &self.sql, e))?;
        Ok(())
    }
}

impl Drop for LiveCursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to release JDBC resources");
        }
    }
}

impl std::fmt::Debug for LiveCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCursor")
            .field("sql", &self.sql)
            .field("closed", &self.is_closed())
            .finish()
    }
}
