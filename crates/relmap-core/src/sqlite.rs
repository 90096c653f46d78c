//! SQLite backend.
//!
//! Adapts a `rusqlite` connection to the [`Connection`] interface. Result
//! rows are read in full when the statement executes, which lets scrollable
//! statements move in both directions.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Value as SqliteValue;

use crate::exec::{
    ColumnMetadata, Connection, PreparedStatement, ResultSet, ResultSetMetadata, SqlError,
    StatementOptions,
};
use relmap_proto::{ScrollMode, SqlType, Value};

/// A SQLite database connection.
///
/// Executing a query steps through every result row and copies it into
/// memory before the first row is returned, under the connection lock.
/// Streams and forward-only scrolls therefore bound the rows handed to the
/// caller, not the memory used, and are not suited to very large results.
#[derive(Clone)]
pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteConnection {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SqlError> {
        rusqlite::Connection::open_in_memory()
            .map(Self::from_connection)
            .map_err(sql_error)
    }

    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqlError> {
        rusqlite::Connection::open(path)
            .map(Self::from_connection)
            .map_err(sql_error)
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run one or more statements that return no rows.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SqlError> {
        self.conn.lock().execute_batch(sql).map_err(sql_error)
    }

    /// Run one statement that returns no rows, with positional parameters.
    pub fn execute(&self, sql: &str, values: &[Value]) -> Result<usize, SqlError> {
        let params: Vec<SqliteValue> = values.iter().map(to_sqlite).collect();
        self.conn
            .lock()
            .execute(sql, rusqlite::params_from_iter(params))
            .map_err(sql_error)
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

impl Connection for SqliteConnection {
    fn prepare_statement(
        &self,
        sql: &str,
        options: &StatementOptions,
    ) -> Result<Box<dyn PreparedStatement>, SqlError> {
        let parameter_count = {
            let conn = self.conn.lock();
            let statement = conn.prepare_cached(sql).map_err(sql_error)?;
            statement.parameter_count()
        };
        Ok(Box::new(SqliteStatement {
            conn: self.conn.clone(),
            sql: sql.to_string(),
            parameters: vec![SqliteValue::Null; parameter_count],
            scroll_mode: options.scroll_mode.unwrap_or_default(),
            closed: false,
        }))
    }
}

struct SqliteStatement {
    conn: Arc<Mutex<rusqlite::Connection>>,
    sql: String,
    parameters: Vec<SqliteValue>,
    scroll_mode: ScrollMode,
    closed: bool,
}

impl PreparedStatement for SqliteStatement {
    fn bind(&mut self, position: usize, value: &Value, _sql_type: SqlType) -> Result<(), SqlError> {
        let count = self.parameters.len();
        let slot = position
            .checked_sub(1)
            .and_then(|index| self.parameters.get_mut(index))
            .ok_or_else(|| {
                SqlError::new(format!("parameter {position} out of range 1..={count}"))
            })?;
        *slot = to_sqlite(value);
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>, SqlError> {
        if self.closed {
            return Err(SqlError::new("statement is closed"));
        }
        let conn = self.conn.lock();
        let mut statement = conn.prepare_cached(&self.sql).map_err(sql_error)?;
        let declared: Vec<(String, Option<SqlType>)> = statement
            .columns()
            .into_iter()
            .map(|column| (column.name().to_string(), column.decl_type().and_then(declared_type)))
            .collect();

        let mut rows = Vec::new();
        let mut cursor = statement
            .query(rusqlite::params_from_iter(self.parameters.iter()))
            .map_err(sql_error)?;
        while let Some(row) = cursor.next().map_err(sql_error)? {
            let values = (0..declared.len())
                .map(|i| row.get::<_, SqliteValue>(i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(sql_error)?;
            rows.push(values);
        }

        let columns = declared
            .into_iter()
            .enumerate()
            .map(|(i, (label, declared))| {
                ColumnMetadata::new(label, declared.or_else(|| column_type(&rows, i)))
            })
            .collect();
        Ok(Box::new(SqliteResultSet {
            metadata: ResultSetMetadata::new(columns),
            rows,
            position: 0,
            scrollable: self.scroll_mode.is_scrollable(),
        }))
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.closed = true;
        Ok(())
    }
}

struct SqliteResultSet {
    metadata: ResultSetMetadata,
    rows: Vec<Vec<SqliteValue>>,
    /// 0 is before the first row, `rows.len() + 1` after the last.
    position: usize,
    scrollable: bool,
}

impl SqliteResultSet {
    fn on_row(&self) -> bool {
        (1..=self.rows.len()).contains(&self.position)
    }

    fn value_at(&self, position: usize) -> Result<&SqliteValue, SqlError> {
        let row = self
            .position
            .checked_sub(1)
            .and_then(|index| self.rows.get(index))
            .ok_or_else(|| SqlError::new("no current row"))?;
        position
            .checked_sub(1)
            .and_then(|index| row.get(index))
            .ok_or_else(|| SqlError::new(format!("column {position} out of range")))
    }

    fn require_scrollable(&self, operation: &str) -> Result<(), SqlError> {
        if self.scrollable {
            Ok(())
        } else {
            Err(SqlError::unsupported(operation))
        }
    }
}

impl ResultSet for SqliteResultSet {
    fn metadata(&self) -> &ResultSetMetadata {
        &self.metadata
    }

    fn next(&mut self) -> Result<bool, SqlError> {
        if self.position <= self.rows.len() {
            self.position += 1;
        }
        Ok(self.on_row())
    }

    fn get(&self, position: usize, sql_type: SqlType) -> Result<Value, SqlError> {
        from_sqlite(self.value_at(position)?, sql_type)
    }

    fn get_object(&self, position: usize) -> Result<Value, SqlError> {
        let value = self.value_at(position)?;
        match storage_type(value) {
            Some(sql_type) => from_sqlite(value, sql_type),
            None => Ok(Value::Null),
        }
    }

    fn previous(&mut self) -> Result<bool, SqlError> {
        self.require_scrollable("previous")?;
        self.position = self.position.saturating_sub(1);
        Ok(self.on_row())
    }

    fn first(&mut self) -> Result<bool, SqlError> {
        self.require_scrollable("first")?;
        self.position = 1;
        Ok(self.on_row())
    }

    fn last(&mut self) -> Result<bool, SqlError> {
        self.require_scrollable("last")?;
        self.position = self.rows.len();
        Ok(self.on_row())
    }

    fn absolute(&mut self, row: i64) -> Result<bool, SqlError> {
        self.require_scrollable("absolute")?;
        let len = self.rows.len() as i64;
        let target = if row >= 0 { row.min(len + 1) } else { (len + 1 + row).max(0) };
        self.position = target as usize;
        Ok(self.on_row())
    }

    fn row_number(&self) -> Result<Option<usize>, SqlError> {
        Ok(self.on_row().then_some(self.position))
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.rows.clear();
        self.position = 0;
        Ok(())
    }
}

fn sql_error(error: rusqlite::Error) -> SqlError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _) => {
            SqlError::new(error.to_string()).with_sql_state(format!("{:?}", failure.code))
        }
        _ => SqlError::new(error.to_string()),
    }
}

/// Type of the first non-null value in column `index`.
fn column_type(rows: &[Vec<SqliteValue>], index: usize) -> Option<SqlType> {
    rows.iter()
        .filter_map(|row| row.get(index))
        .find_map(storage_type)
}

fn storage_type(value: &SqliteValue) -> Option<SqlType> {
    match value {
        SqliteValue::Null => None,
        SqliteValue::Integer(_) => Some(SqlType::BigInt),
        SqliteValue::Real(_) => Some(SqlType::Double),
        SqliteValue::Text(_) => Some(SqlType::Varchar),
        SqliteValue::Blob(_) => Some(SqlType::VarBinary),
    }
}

/// Map a declared column type by SQLite's affinity rules.
fn declared_type(decl: &str) -> Option<SqlType> {
    let decl = decl.to_ascii_uppercase();
    if decl.contains("INT") {
        Some(SqlType::BigInt)
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        Some(SqlType::Varchar)
    } else if decl.contains("BLOB") {
        Some(SqlType::VarBinary)
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        Some(SqlType::Double)
    } else {
        None
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int32(i) => SqliteValue::Integer(i64::from(*i)),
        Value::Int64(i) | Value::Timestamp(i) => SqliteValue::Integer(*i),
        Value::Float32(f) => SqliteValue::Real(f64::from(*f)),
        Value::Float64(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Uuid(u) => SqliteValue::Blob(u.to_vec()),
    }
}

fn from_sqlite(value: &SqliteValue, sql_type: SqlType) -> Result<Value, SqlError> {
    let mismatch = || {
        SqlError::new(format!(
            "cannot read {} as {}",
            match value {
                SqliteValue::Null => "null",
                SqliteValue::Integer(_) => "integer",
                SqliteValue::Real(_) => "real",
                SqliteValue::Text(_) => "text",
                SqliteValue::Blob(_) => "blob",
            },
            sql_type
        ))
    };
    let converted = match (value, sql_type) {
        (SqliteValue::Null, _) => Value::Null,
        (SqliteValue::Integer(i), SqlType::Boolean) => Value::Bool(*i != 0),
        (SqliteValue::Integer(i), SqlType::Integer) => {
            Value::Int32(i32::try_from(*i).map_err(|_| mismatch())?)
        }
        (SqliteValue::Integer(i), SqlType::BigInt) => Value::Int64(*i),
        (SqliteValue::Integer(i), SqlType::Timestamp) => Value::Timestamp(*i),
        (SqliteValue::Integer(i), SqlType::Real) => Value::Float32(*i as f32),
        (SqliteValue::Integer(i), SqlType::Double) => Value::Float64(*i as f64),
        (SqliteValue::Integer(i), SqlType::Varchar) => Value::String(i.to_string()),
        (SqliteValue::Real(f), SqlType::Real) => Value::Float32(*f as f32),
        (SqliteValue::Real(f), SqlType::Double) => Value::Float64(*f),
        (SqliteValue::Real(f), SqlType::Varchar) => Value::String(f.to_string()),
        (SqliteValue::Text(s), SqlType::Varchar) => Value::String(s.clone()),
        (SqliteValue::Blob(b), SqlType::VarBinary) => Value::Bytes(b.clone()),
        (SqliteValue::Blob(b), SqlType::Uuid) => {
            Value::Uuid(<[u8; 16]>::try_from(b.as_slice()).map_err(|_| mismatch())?)
        }
        _ => return Err(mismatch()),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "create table t (id integer primary key, name text, score real);
             insert into t values (1, 'a', 1.5), (2, 'b', null), (3, 'c', 2.0);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_query_and_read() {
        let conn = connection();
        let mut statement = conn
            .prepare_statement("select id, name from t where id > ? order by id", &StatementOptions::default())
            .unwrap();
        statement.bind(1, &Value::Int64(1), SqlType::BigInt).unwrap();
        let mut rs = statement.execute_query().unwrap();
        assert_eq!(rs.metadata().column_count(), 2);
        assert_eq!(rs.metadata().column_type(0), Some(SqlType::BigInt));
        assert!(rs.next().unwrap());
        assert_eq!(rs.get(1, SqlType::BigInt).unwrap(), Value::Int64(2));
        assert_eq!(rs.get(2, SqlType::Varchar).unwrap(), Value::String("b".into()));
        assert!(rs.next().unwrap());
        assert!(!rs.next().unwrap());
        assert!(rs.previous().is_err());
    }

    #[test]
    fn test_scrollable_navigation() {
        let conn = connection();
        let mut statement = conn
            .prepare_statement(
                "select id from t order by id",
                &StatementOptions::scrollable(ScrollMode::ScrollInsensitive),
            )
            .unwrap();
        let mut rs = statement.execute_query().unwrap();
        assert!(rs.last().unwrap());
        assert_eq!(rs.get(1, SqlType::BigInt).unwrap(), Value::Int64(3));
        assert!(rs.previous().unwrap());
        assert_eq!(rs.row_number().unwrap(), Some(2));
        assert!(rs.absolute(-3).unwrap());
        assert_eq!(rs.get(1, SqlType::BigInt).unwrap(), Value::Int64(1));
        assert!(!rs.absolute(10).unwrap());
        assert!(rs.first().unwrap());
    }

    #[test]
    fn test_declared_type_covers_null_and_empty_results() {
        let conn = connection();
        let mut statement = conn
            .prepare_statement("select score from t where id = 2", &StatementOptions::default())
            .unwrap();
        let rs = statement.execute_query().unwrap();
        assert_eq!(rs.metadata().column_type(0), Some(SqlType::Double));

        let mut statement = conn
            .prepare_statement("select name from t where id = 99", &StatementOptions::default())
            .unwrap();
        let rs = statement.execute_query().unwrap();
        assert_eq!(rs.metadata().column_type(0), Some(SqlType::Varchar));
    }

    #[test]
    fn test_expression_without_rows_has_unknown_type() {
        let conn = connection();
        let mut statement = conn
            .prepare_statement("select upper(name) from t where id = 99", &StatementOptions::default())
            .unwrap();
        let rs = statement.execute_query().unwrap();
        assert_eq!(rs.metadata().column_type(0), None);
    }

    #[test]
    fn test_get_object_uses_storage_class() {
        let conn = connection();
        let mut statement = conn
            .prepare_statement("select upper(name), score from t where id = 2", &StatementOptions::default())
            .unwrap();
        let mut rs = statement.execute_query().unwrap();
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_object(1).unwrap(), Value::String("B".into()));
        assert_eq!(rs.get_object(2).unwrap(), Value::Null);
    }

    #[test]
    fn test_rows_are_read_when_the_query_executes() {
        let conn = connection();
        let mut statement = conn
            .prepare_statement("select id from t order by id", &StatementOptions::default())
            .unwrap();
        let mut rs = statement.execute_query().unwrap();
        conn.execute("delete from t", &[]).unwrap();

        let mut ids = Vec::new();
        while rs.next().unwrap() {
            ids.push(rs.get(1, SqlType::BigInt).unwrap());
        }
        assert_eq!(ids, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
    }

    #[test]
    fn test_bad_sql_fails_at_prepare() {
        let conn = connection();
        assert!(conn
            .prepare_statement("select nope from missing", &StatementOptions::default())
            .is_err());
    }
}
