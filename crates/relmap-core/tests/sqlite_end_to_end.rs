//! End-to-end runs against an in-memory SQLite database.
#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use relmap_core::proto::{
    Criteria, LockMode, LockOptions, Order, Projection, Restriction, ScrollMode, Value,
};
use relmap_core::results::Fetched;
use relmap_core::{
    AliasToMap, Engine, EngineConfig, ResultValue, RootEntity, RowTransformer, Session,
    SqliteConnection,
};

const SCHEMA: &str = "
    create table customers (
        id integer primary key,
        name text not null,
        active text not null,
        tier integer not null,
        region text not null
    );
    create table orders (
        id integer primary key,
        customer_id integer not null references customers (id),
        total real not null,
        status text not null
    );
    create table order_lines (
        order_id integer not null references orders (id),
        line_no integer not null,
        product text not null,
        quantity integer not null,
        price real not null,
        primary key (order_id, line_no)
    );

    insert into customers values (1, 'Alice', 'Y', 2, 'EMEA');
    insert into customers values (2, 'Bob', 'N', 0, 'APAC');
    insert into customers values (3, 'Cleo', 'Y', 1, 'EMEA');

    insert into orders values (10, 1, 25.0, 'PAID');
    insert into orders values (11, 1, 5.5, 'NEW');
    insert into orders values (12, 3, 40.0, 'SHIPPED');

    insert into order_lines values (10, 1, 'pen', 10, 1.5);
    insert into order_lines values (10, 2, 'ink', 2, 5.0);
    insert into order_lines values (12, 1, 'pen', 4, 1.5);
";

fn setup(config: EngineConfig) -> (Engine, Session, SqliteConnection) {
    let connection = SqliteConnection::open_in_memory().unwrap();
    connection.execute_batch(SCHEMA).unwrap();
    let engine = Engine::from_config(common::catalog(), config.with_dialect("sqlite")).unwrap();
    let session = engine.open_session(Arc::new(connection.clone()));
    (engine, session, connection)
}

fn name_of(value: &ResultValue) -> Value {
    value
        .as_entity()
        .and_then(|e| e.get_value("name"))
        .cloned()
        .unwrap_or(Value::Null)
}

#[test]
fn test_list_with_converters_and_paging() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let criteria = Criteria::new("Customer")
        .add(Restriction::is_true("active"))
        .order(Order::desc("name"));

    let rows = engine.list(&session, &criteria, &RootEntity).unwrap();
    assert_eq!(
        rows.iter().map(name_of).collect::<Vec<_>>(),
        vec![Value::from("Cleo"), Value::from("Alice")]
    );
    let cleo = rows[0].as_entity().unwrap();
    assert_eq!(cleo.get_value("tier"), Some(&Value::from("SILVER")));
    assert_eq!(cleo.get_value("active"), Some(&Value::Bool(true)));

    let page = engine
        .list(
            &session,
            &Criteria::new("Customer").order(Order::asc("name")).first_result(1).max_results(1),
            &RootEntity,
        )
        .unwrap();
    assert_eq!(page.iter().map(name_of).collect::<Vec<_>>(), vec![Value::from("Bob")]);
}

#[test]
fn test_enum_and_join_restrictions() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let criteria = Criteria::new("Customer")
        .join("orders", "o")
        .add(Restriction::eq("o.status", "SHIPPED"));

    let rows = engine.list(&session, &criteria, &RootEntity).unwrap();

    assert_eq!(rows.iter().map(name_of).collect::<Vec<_>>(), vec![Value::from("Cleo")]);
}

#[test]
fn test_grouped_projection() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let criteria = Criteria::new("OrderLine")
        .project_as(Projection::group("product"), "product")
        .project_as(Projection::sum("quantity"), "units")
        .order(Order::asc("product"));

    let rows = engine.list(&session, &criteria, &AliasToMap).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["product"], ResultValue::Scalar(Value::from("ink")));
    assert_eq!(rows[0]["units"], ResultValue::Scalar(Value::Int64(2)));
    assert_eq!(rows[1]["units"], ResultValue::Scalar(Value::Int64(14)));
}

#[test]
fn test_locked_distinct_projection_keeps_distinct_rows() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let criteria = Criteria::new("Customer")
        .project(Projection::property("region"))
        .distinct()
        .order(Order::asc("region"))
        .with_lock_options(LockOptions::upgrade().with_follow_on_locking(true));

    let rows = engine.list(&session, &criteria, &RootEntity).unwrap();

    assert_eq!(
        rows,
        vec![
            ResultValue::Scalar(Value::from("APAC")),
            ResultValue::Scalar(Value::from("EMEA")),
        ]
    );
}

#[test]
fn test_untyped_expression_with_no_rows() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let criteria = Criteria::new("Customer")
        .project(Projection::sql("upper({alias}.name)", "n", None))
        .add(Restriction::eq("name", "Nobody"));

    let rows = engine.list(&session, &criteria, &RootEntity).unwrap();
    assert!(rows.is_empty());

    let criteria = Criteria::new("Customer")
        .project(Projection::sql("upper({alias}.name)", "n", None))
        .add(Restriction::eq("name", "Bob"));
    let rows = engine.list(&session, &criteria, &RootEntity).unwrap();
    assert_eq!(rows, vec![ResultValue::Scalar(Value::from("BOB"))]);
}

#[test]
fn test_scroll_insensitive_navigation() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let transformer: Arc<dyn RowTransformer<ResultValue>> = Arc::new(RootEntity);
    let mut results = engine
        .scroll(
            &session,
            &Criteria::new("Customer").order(Order::asc("name")),
            ScrollMode::ScrollInsensitive,
            transformer,
        )
        .unwrap();

    assert!(results.last().unwrap());
    assert_eq!(name_of(results.get().unwrap()), Value::from("Cleo"));
    assert_eq!(results.row_number().unwrap(), Some(3));
    assert!(results.previous().unwrap());
    assert_eq!(name_of(results.get().unwrap()), Value::from("Bob"));
    assert!(results.absolute(1).unwrap());
    assert_eq!(name_of(results.get().unwrap()), Value::from("Alice"));
    assert!(!results.absolute(7).unwrap());
    assert!(results.get().is_none());
    results.close().unwrap();
    assert!(results.is_closed());
}

#[test]
fn test_forward_only_scroll_rejects_going_back() {
    let (engine, session, _db) = setup(EngineConfig::new());
    let transformer: Arc<dyn RowTransformer<ResultValue>> = Arc::new(RootEntity);
    let mut results = engine
        .scroll(
            &session,
            &Criteria::new("Customer"),
            ScrollMode::ForwardOnly,
            transformer,
        )
        .unwrap();

    assert!(results.next().unwrap());
    assert!(results.previous().is_err());
}

#[test]
fn test_stream_with_fetched_collections() {
    let (engine, mut session, _db) = setup(EngineConfig::new());
    session.enable_fetch_profile("customer-orders");
    let transformer: Arc<dyn RowTransformer<ResultValue>> = Arc::new(RootEntity);

    let customers: Vec<ResultValue> = engine
        .stream(
            &session,
            &Criteria::new("Customer").order(Order::asc("name")),
            transformer,
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let order_counts: Vec<usize> = customers
        .iter()
        .map(|c| match c.as_entity().and_then(|e| e.fetched("orders")) {
            Some(Fetched::Many(orders)) => orders.len(),
            _ => usize::MAX,
        })
        .collect();
    assert_eq!(order_counts, vec![2, 0, 1]);
}

#[test]
fn test_filter_restricts_results() {
    let (engine, mut session, _db) = setup(EngineConfig::new());
    session.enable_filter("byRegion", [("region", Value::from("APAC"))]);

    let rows = engine
        .list(&session, &Criteria::new("Customer"), &RootEntity)
        .unwrap();

    assert_eq!(rows.iter().map(name_of).collect::<Vec<_>>(), vec![Value::from("Bob")]);
}

#[test]
fn test_load_by_composite_id_and_lock_is_plain_select() {
    let (engine, session, _db) = setup(EngineConfig::new());

    let line = engine
        .load(
            &session,
            "OrderLine",
            &[Value::Int64(10), Value::Int32(2)],
            &LockOptions::new(LockMode::PessimisticWrite),
        )
        .unwrap()
        .unwrap();
    assert_eq!(line.get_value("product"), Some(&Value::from("ink")));
    assert_eq!(line.get_value("price"), Some(&Value::Float64(5.0)));

    let missing = engine
        .load(&session, "Customer", &[Value::Int64(42)], &LockOptions::none())
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_cached_results_until_invalidated() {
    let (engine, session, db) = setup(EngineConfig::new().with_query_cache(true));
    let criteria = Criteria::new("Order")
        .add(Restriction::gt("total", 10.0))
        .order(Order::asc("total"))
        .cacheable(true);

    let before = engine.list(&session, &criteria, &RootEntity).unwrap();
    assert_eq!(before.len(), 2);

    db.execute(
        "insert into orders values (?, ?, ?, ?)",
        &[
            Value::Int64(13),
            Value::Int64(2),
            Value::Float64(99.0),
            Value::from("NEW"),
        ],
    )
    .unwrap();
    let cached = engine.list(&session, &criteria, &RootEntity).unwrap();
    assert_eq!(cached, before);

    engine.invalidate_query_spaces(["orders"]);
    let fresh = engine.list(&session, &criteria, &RootEntity).unwrap();
    assert_eq!(fresh.len(), 3);
}
