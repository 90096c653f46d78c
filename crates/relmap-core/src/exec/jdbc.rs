//! Backend access interfaces.
//!
//! The executor talks to the database only through these traits. Positions
//! are 1-based for both parameters and columns.

use thiserror::Error;

use relmap_proto::{ScrollMode, SqlType, Value};

/// An error reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SqlError {
    pub message: String,
    /// SQLSTATE code, when the backend reports one.
    pub sql_state: Option<String>,
}

impl SqlError {
    /// Create an error without an SQLSTATE.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
        }
    }

    /// Attach an SQLSTATE code.
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    /// The cursor does not support the requested navigation.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(format!("{operation} is not supported by a forward-only result set"))
    }
}

/// Label and type of one result set column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub label: String,
    /// `None` when the backend cannot report the column type.
    pub sql_type: Option<SqlType>,
}

impl ColumnMetadata {
    pub fn new(label: impl Into<String>, sql_type: Option<SqlType>) -> Self {
        Self {
            label: label.into(),
            sql_type,
        }
    }
}

/// Result set column descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSetMetadata {
    pub columns: Vec<ColumnMetadata>,
}

impl ResultSetMetadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 0-based index of the column labelled `label`, ignoring case.
    pub fn find_column(&self, label: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.label.eq_ignore_ascii_case(label))
    }

    /// Type of the column at 0-based `index`.
    pub fn column_type(&self, index: usize) -> Option<SqlType> {
        self.columns.get(index).and_then(|c| c.sql_type)
    }
}

/// Cursor lifetime across transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Holdability {
    #[default]
    CloseCursorsAtCommit,
    HoldCursorsOverCommit,
}

/// How a statement is prepared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatementOptions {
    /// `None` prepares a plain forward-only statement.
    pub scroll_mode: Option<ScrollMode>,
    pub holdability: Holdability,
    pub fetch_size: Option<u32>,
    pub timeout_secs: Option<u32>,
}

impl StatementOptions {
    /// Options for a scrollable statement closed at commit.
    pub fn scrollable(mode: ScrollMode) -> Self {
        Self {
            scroll_mode: Some(mode),
            holdability: Holdability::CloseCursorsAtCommit,
            ..Default::default()
        }
    }

    pub fn with_fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: Option<u32>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A database connection able to prepare statements.
pub trait Connection: Send + Sync {
    /// Prepare `sql` for execution.
    fn prepare_statement(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Box<dyn PreparedStatement>, SqlError>;
}

/// A prepared, parameterized statement.
pub trait PreparedStatement: Send {
    /// Bind `value` to the 1-based parameter `position`.
    fn bind(&mut self, position: usize, value: &Value, sql_type: SqlType) -> Result<(), SqlError>;

    /// Execute the statement as a query.
    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>, SqlError>;

    /// Release the statement.
    fn close(&mut self) -> Result<(), SqlError>;
}

/// A cursor over query results.
///
/// Navigation other than [`ResultSet::next`] is only available on scrollable
/// result sets.
pub trait ResultSet: Send {
    fn metadata(&self) -> &ResultSetMetadata;

    /// Advance to the next row.
    fn next(&mut self) -> Result<bool, SqlError>;

    /// Read the column at 1-based `position` of the current row.
    fn get(&self, position: usize, sql_type: SqlType) -> Result<Value, SqlError>;

    /// Read the column at 1-based `position` as the driver's own type for
    /// the stored value. Used when the metadata gave no column type.
    fn get_object(&self, _position: usize) -> Result<Value, SqlError> {
        Err(SqlError::unsupported("get_object"))
    }

    fn previous(&mut self) -> Result<bool, SqlError> {
        Err(SqlError::unsupported("previous"))
    }

    fn first(&mut self) -> Result<bool, SqlError> {
        Err(SqlError::unsupported("first"))
    }

    fn last(&mut self) -> Result<bool, SqlError> {
        Err(SqlError::unsupported("last"))
    }

    /// Move to the 1-based `row`; negative rows count from the end.
    fn absolute(&mut self, _row: i64) -> Result<bool, SqlError> {
        Err(SqlError::unsupported("absolute"))
    }

    /// 1-based number of the current row, if positioned on one.
    fn row_number(&self) -> Result<Option<usize>, SqlError> {
        Err(SqlError::unsupported("row_number"))
    }

    /// Release the cursor.
    fn close(&mut self) -> Result<(), SqlError>;
}
