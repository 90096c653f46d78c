//! Query results caching through the engine.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{customer_row, Activity, Script, ScriptedConnection};
use relmap_core::dialect::AnsiDialect;
use relmap_core::proto::{CacheMode, Criteria, Restriction, ScrollMode, Value};
use relmap_core::{
    Connection, Engine, EngineConfig, ResultValue, RootEntity, RowTransformer, TupleTransformer,
};

fn caching_engine() -> Engine {
    Engine::new(
        common::catalog(),
        Arc::new(AnsiDialect),
        EngineConfig::new().with_query_cache(true),
    )
}

fn customers() -> (Arc<dyn Connection>, Arc<Activity>) {
    ScriptedConnection::new()
        .on(
            "from customers this_",
            Script::rows(vec![
                customer_row(1, "Alice", "Y", 2, "EMEA"),
                customer_row(2, "Bob", "N", 1, "EMEA"),
            ]),
        )
        .into_arc()
}

fn in_region(region: &str) -> Criteria {
    Criteria::new("Customer")
        .add(Restriction::eq("region", region))
        .cacheable(true)
}

fn names(rows: &[ResultValue]) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| row.as_entity()?.get_value("name").cloned())
        .collect()
}

#[test]
fn test_second_list_is_served_from_cache() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);

    let first = engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    let second = engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();

    assert_eq!(first, second);
    assert_eq!(names(&second), vec![Value::from("Alice"), Value::from("Bob")]);
    assert_eq!(activity.prepare_count(), 1);
}

#[test]
fn test_different_parameters_miss() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);

    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    engine.list(&session, &in_region("APAC"), &RootEntity).unwrap();

    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_capacity_bounds_cached_queries() {
    let (connection, activity) = customers();
    let engine = Engine::new(
        common::catalog(),
        Arc::new(AnsiDialect),
        EngineConfig::new()
            .with_query_cache(true)
            .with_query_cache_max_entries(1),
    );
    let session = engine.open_session(connection);

    for region in ["EMEA", "APAC", "EMEA", "APAC"] {
        engine.list(&session, &in_region(region), &RootEntity).unwrap();
    }
    assert_eq!(activity.prepare_count(), 4);

    engine.list(&session, &in_region("APAC"), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 4);
}

#[test]
fn test_uncacheable_query_always_executes() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);
    let criteria = in_region("EMEA").cacheable(false);

    engine.list(&session, &criteria, &RootEntity).unwrap();
    engine.list(&session, &criteria, &RootEntity).unwrap();

    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_disabled_query_cache_always_executes() {
    let (connection, activity) = customers();
    let engine = Engine::new(common::catalog(), Arc::new(AnsiDialect), EngineConfig::new());
    let session = engine.open_session(connection);

    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();

    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_cached_rows_are_independent_of_the_transformer() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);

    let tuples = engine
        .list(&session, &in_region("EMEA"), &TupleTransformer)
        .unwrap();
    let roots = engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();

    assert_eq!(activity.prepare_count(), 1);
    assert_eq!(tuples.len(), 2);
    assert_eq!(tuples[0].len(), 1);
    assert_eq!(roots, tuples.into_iter().flatten().collect::<Vec<_>>());
}

#[test]
fn test_invalidated_space_forces_execution() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);

    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    engine.invalidate_query_spaces(["orders"]);
    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 1);

    engine.invalidate_query_spaces(["customers"]);
    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 2);

    // Re-executed rows were cached again.
    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_cache_modes() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);
    let with_mode = |mode| in_region("EMEA").cache_mode(mode);

    // Get never writes.
    engine.list(&session, &with_mode(CacheMode::Get), &RootEntity).unwrap();
    engine.list(&session, &with_mode(CacheMode::Get), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 2);

    // Put writes without reading.
    engine.list(&session, &with_mode(CacheMode::Put), &RootEntity).unwrap();
    engine.list(&session, &with_mode(CacheMode::Put), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 4);

    // Now cached, so Get is served.
    engine.list(&session, &with_mode(CacheMode::Get), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 4);

    // Ignore neither reads nor writes; Refresh always executes.
    engine.list(&session, &with_mode(CacheMode::Ignore), &RootEntity).unwrap();
    engine.list(&session, &with_mode(CacheMode::Refresh), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 6);

    engine.list(&session, &with_mode(CacheMode::Normal), &RootEntity).unwrap();
    assert_eq!(activity.prepare_count(), 6);
}

#[test]
fn test_session_cache_mode_applies_when_query_sets_none() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let mut session = engine.open_session(connection);
    session.set_cache_mode(CacheMode::Ignore);

    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    session.set_cache_mode(CacheMode::Normal);
    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();

    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_tenants_do_not_share_entries() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let acme = engine.open_session(connection.clone()).with_tenant("acme");
    let globex = engine.open_session(connection).with_tenant("globex");

    engine.list(&acme, &in_region("EMEA"), &RootEntity).unwrap();
    engine.list(&globex, &in_region("EMEA"), &RootEntity).unwrap();
    engine.list(&acme, &in_region("EMEA"), &RootEntity).unwrap();

    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_scroll_bypasses_cache() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);
    let transformer: Arc<dyn RowTransformer<ResultValue>> = Arc::new(RootEntity);

    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    let mut results = engine
        .scroll(
            &session,
            &in_region("EMEA"),
            ScrollMode::ForwardOnly,
            transformer.clone(),
        )
        .unwrap();
    assert!(results.next().unwrap());
    results.close().unwrap();
    let streamed = engine
        .stream(&session, &in_region("EMEA"), transformer)
        .unwrap()
        .count();

    assert_eq!(streamed, 2);
    assert_eq!(activity.prepare_count(), 3);
}

#[test]
fn test_empty_result_is_not_a_hit() {
    let (connection, activity) = ScriptedConnection::new()
        .once("from customers this_", Script::empty(5))
        .on("from customers this_", Script::rows(vec![customer_row(9, "Ivy", "Y", 0, "EMEA")]))
        .into_arc();
    let engine = caching_engine();
    let session = engine.open_session(connection);

    let empty = engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    let filled = engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();

    assert!(empty.is_empty());
    assert_eq!(names(&filled), vec![Value::from("Ivy")]);
    assert_eq!(activity.prepare_count(), 2);
}

#[test]
fn test_named_regions_are_separate() {
    let (connection, activity) = customers();
    let engine = caching_engine();
    let session = engine.open_session(connection);

    engine.list(&session, &in_region("EMEA"), &RootEntity).unwrap();
    engine
        .list(&session, &in_region("EMEA").cache_region("reports"), &RootEntity)
        .unwrap();
    engine
        .list(&session, &in_region("EMEA").cache_region("reports"), &RootEntity)
        .unwrap();

    assert_eq!(activity.prepare_count(), 2);
}
