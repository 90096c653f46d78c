//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use relmap_core::catalog::{
    AttributeDef, ComponentDef, FetchProfileDef, SchemaBundle, ValueConverter,
};
use relmap_core::exec::{
    ColumnMetadata, Connection, PreparedStatement, ResultSet, ResultSetMetadata, SqlError,
    StatementOptions,
};
use relmap_core::{Catalog, EntityDef, RelationDef};
use relmap_core::proto::{SqlType, Value};

/// Customers place orders made of order lines.
///
/// - `Customer(id)`: `name`, `active` (Y/N flag), `tier` (enum by ordinal),
///   `region`; filter `byRegion`.
/// - `Order(id)`: `customer_id`, `total`, `status` (enum by name).
/// - `OrderLine(order_id, line_no)`: `product`, `quantity`, `price`.
/// - Fetch profile `customer-orders` fetches `Customer.orders`.
pub fn schema() -> SchemaBundle {
    let customer = EntityDef::new("Customer", "customers", "id", SqlType::BigInt)
        .with_attributes([
            AttributeDef::basic("name", "name", SqlType::Varchar),
            AttributeDef::converted("active", "active", ValueConverter::YesNoBoolean),
            AttributeDef::converted(
                "tier",
                "tier",
                ValueConverter::enum_ordinal(["BRONZE", "SILVER", "GOLD"]),
            ),
            AttributeDef::basic("region", "region", SqlType::Varchar),
        ])
        .with_filter("byRegion", "{alias}.region = :region");
    let order = EntityDef::new("Order", "orders", "id", SqlType::BigInt).with_attributes([
        AttributeDef::basic("customer_id", "customer_id", SqlType::BigInt),
        AttributeDef::basic("total", "total", SqlType::Double),
        AttributeDef::converted(
            "status",
            "status",
            ValueConverter::enum_string(["NEW", "PAID", "SHIPPED"]),
        ),
    ]);
    let line = EntityDef::with_composite_id(
        "OrderLine",
        "order_lines",
        vec![
            ComponentDef::new("order_id", "order_id", SqlType::BigInt),
            ComponentDef::new("line_no", "line_no", SqlType::Integer),
        ],
    )
    .with_attributes([
        AttributeDef::basic("product", "product", SqlType::Varchar),
        AttributeDef::basic("quantity", "quantity", SqlType::Integer),
        AttributeDef::basic("price", "price", SqlType::Double),
    ]);

    SchemaBundle::new(1)
        .with_entity(customer)
        .with_entity(order)
        .with_entity(line)
        .with_relation(RelationDef::one_to_many("orders", "Customer", "id", "Order", "customer_id"))
        .with_relation(RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id"))
        .with_relation(RelationDef::one_to_many("lines", "Order", "id", "OrderLine", "order_id"))
        .with_relation(RelationDef::many_to_one("order", "OrderLine", "order_id", "Order", "id"))
        .with_fetch_profile(FetchProfileDef::new("customer-orders").with_fetch("Customer", "orders"))
}

pub fn catalog() -> Catalog {
    Catalog::new(schema()).expect("fixture schema is valid")
}

/// Counters shared by a [`ScriptedConnection`] and everything it hands out.
#[derive(Debug, Default)]
pub struct Activity {
    pub prepared: Mutex<Vec<String>>,
    pub bound: Mutex<Vec<(usize, Value)>>,
    pub statements_closed: AtomicUsize,
    pub result_sets_closed: AtomicUsize,
    /// Successful `next` calls that landed on a row.
    pub rows_fetched: AtomicUsize,
}

impl Activity {
    pub fn prepared(&self) -> Vec<String> {
        self.prepared.lock().clone()
    }

    pub fn prepare_count(&self) -> usize {
        self.prepared.lock().len()
    }

    pub fn statements_closed(&self) -> usize {
        self.statements_closed.load(Ordering::SeqCst)
    }

    pub fn result_sets_closed(&self) -> usize {
        self.result_sets_closed.load(Ordering::SeqCst)
    }

    pub fn rows_fetched(&self) -> usize {
        self.rows_fetched.load(Ordering::SeqCst)
    }

    pub fn bound_values(&self) -> Vec<Value> {
        self.bound.lock().iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Rows returned for statements whose SQL contains a fragment.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub columns: usize,
    pub rows: Vec<Vec<Value>>,
    /// Column types reported by the metadata; unknown when absent.
    pub column_types: Vec<Option<SqlType>>,
    /// 1-based row whose column reads fail.
    pub fail_reading_row: Option<usize>,
}

impl Script {
    pub fn rows(rows: Vec<Vec<Value>>) -> Self {
        let columns = rows.first().map_or(0, Vec::len);
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    pub fn empty(columns: usize) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn with_column_types(mut self, types: Vec<Option<SqlType>>) -> Self {
        self.column_types = types;
        self
    }

    pub fn failing_at_row(mut self, row: usize) -> Self {
        self.fail_reading_row = Some(row);
        self
    }
}

/// A connection answering queries from scripts, recording what it is asked.
///
/// Scripts are matched in registration order against the SQL text; a script
/// registered with [`ScriptedConnection::once`] is consumed by its first use.
#[derive(Default)]
pub struct ScriptedConnection {
    scripts: Mutex<VecDeque<(String, Script, bool)>>,
    pub activity: Arc<Activity>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every statement containing `fragment` with `script`.
    pub fn on(self, fragment: &str, script: Script) -> Self {
        self.scripts.lock().push_back((fragment.to_string(), script, false));
        self
    }

    /// Answer the next statement containing `fragment` with `script`.
    pub fn once(self, fragment: &str, script: Script) -> Self {
        self.scripts.lock().push_back((fragment.to_string(), script, true));
        self
    }

    pub fn into_arc(self) -> (Arc<dyn Connection>, Arc<Activity>) {
        let activity = self.activity.clone();
        (Arc::new(self), activity)
    }

    fn script_for(&self, sql: &str) -> Option<Script> {
        let mut scripts = self.scripts.lock();
        let index = scripts.iter().position(|(fragment, _, _)| sql.contains(fragment.as_str()))?;
        if scripts[index].2 {
            scripts.remove(index).map(|(_, script, _)| script)
        } else {
            Some(scripts[index].1.clone())
        }
    }
}

impl Connection for ScriptedConnection {
    fn prepare_statement(
        &self,
        sql: &str,
        _options: &StatementOptions,
    ) -> Result<Box<dyn PreparedStatement>, SqlError> {
        self.activity.prepared.lock().push(sql.to_string());
        let script = self
            .script_for(sql)
            .ok_or_else(|| SqlError::new(format!("no script for: {sql}")).with_sql_state("42000"))?;
        Ok(Box::new(ScriptedStatement {
            script,
            activity: self.activity.clone(),
        }))
    }
}

struct ScriptedStatement {
    script: Script,
    activity: Arc<Activity>,
}

impl PreparedStatement for ScriptedStatement {
    fn bind(&mut self, position: usize, value: &Value, _sql_type: SqlType) -> Result<(), SqlError> {
        self.activity.bound.lock().push((position, value.clone()));
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>, SqlError> {
        let columns = (0..self.script.columns)
            .map(|i| {
                ColumnMetadata::new(
                    format!("col_{i}"),
                    self.script.column_types.get(i).copied().flatten(),
                )
            })
            .collect();
        Ok(Box::new(ScriptedResultSet {
            metadata: ResultSetMetadata::new(columns),
            rows: self.script.rows.clone(),
            fail_reading_row: self.script.fail_reading_row,
            position: 0,
            activity: self.activity.clone(),
        }))
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.activity.statements_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedResultSet {
    metadata: ResultSetMetadata,
    rows: Vec<Vec<Value>>,
    fail_reading_row: Option<usize>,
    position: usize,
    activity: Arc<Activity>,
}

impl ResultSet for ScriptedResultSet {
    fn metadata(&self) -> &ResultSetMetadata {
        &self.metadata
    }

    fn next(&mut self) -> Result<bool, SqlError> {
        if self.position > self.rows.len() {
            return Ok(false);
        }
        self.position += 1;
        let on_row = self.position <= self.rows.len();
        if on_row {
            self.activity.rows_fetched.fetch_add(1, Ordering::SeqCst);
        }
        Ok(on_row)
    }

    fn get(&self, position: usize, _sql_type: SqlType) -> Result<Value, SqlError> {
        if self.fail_reading_row == Some(self.position) {
            return Err(SqlError::new("connection reset while reading").with_sql_state("08006"));
        }
        self.rows
            .get(self.position.wrapping_sub(1))
            .and_then(|row| row.get(position - 1))
            .cloned()
            .ok_or_else(|| SqlError::new(format!("no column {position} on row {}", self.position)))
    }

    fn get_object(&self, position: usize) -> Result<Value, SqlError> {
        self.get(position, SqlType::Varchar)
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.activity.result_sets_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Run `f` with a subscriber writing warnings to a buffer; returns the output.
pub fn capture_warnings(f: impl FnOnce()) -> String {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || CaptureWriter(writer.clone()))
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.lock().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One raw customer row in entity column order: id, name, active, tier, region.
pub fn customer_row(id: i64, name: &str, active: &str, tier: i32, region: &str) -> Vec<Value> {
    vec![
        Value::Int64(id),
        Value::String(name.into()),
        Value::String(active.into()),
        Value::Int32(tier),
        Value::String(region.into()),
    ]
}
