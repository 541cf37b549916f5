use sql_workpool::prelude::*;
use sql_workpool::test_utils::{self, SEL_ACCOUNT_BY_EMAIL};
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

#[test]
#[should_panic(expected = "out of range")]
fn statement_id_beyond_catalog_is_a_precondition_violation() {
    test_utils::init_tracing();
    let pool = WorkerPool::open(
        ConnectInfo::with_database(unique_db_path("oob")),
        test_utils::account_catalog(),
        1,
        0,
    )
    .expect("open pool");
    let _ = pool.statement(99);
}

#[test]
#[should_panic(expected = "out of range")]
fn parameter_index_beyond_capacity_is_a_precondition_violation() {
    let mut params = ParameterSet::new(SEL_ACCOUNT_BY_EMAIL, 1);
    params.set(1, "late@x.com");
}

#[test]
fn reassigning_a_slot_is_diagnosed_and_the_new_value_wins() {
    test_utils::init_tracing();
    let mut params = ParameterSet::new(0, 2);
    params.set(0, 1_i64);
    params.set(0, 2_i64);
    assert_eq!(params.get(0), Some(&SqlValue::Int64(2)));
    assert_eq!(params.assigned_count(), 1);
}

#[test]
fn parameter_set_is_sized_from_the_shared_count_table() {
    test_utils::init_tracing();
    let mut pool = WorkerPool::open(
        ConnectInfo::with_database(unique_db_path("sizing")),
        test_utils::account_catalog(),
        1,
        1,
    )
    .expect("open pool");
    pool.sync_execute(test_utils::ACCOUNT_SCHEMA).expect("schema");

    // Before preparation the count table is empty; sets have no capacity.
    assert_eq!(pool.statement(SEL_ACCOUNT_BY_EMAIL).capacity(), 0);

    pool.prepare_statements().expect("prepare");
    assert_eq!(pool.statement(SEL_ACCOUNT_BY_EMAIL).capacity(), 1);
    assert_eq!(pool.statement(test_utils::INS_ACCOUNT).capacity(), 5);
    // The async-only statement's count comes from the async connection.
    assert_eq!(pool.statement(test_utils::SEL_ACCOUNT_INTRO).capacity(), 1);
}

#[test]
fn display_forms_render_every_value_kind() {
    let timestamp = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        .expect("date")
        .and_hms_milli_opt(10, 30, 0, 250)
        .expect("time");
    let cases: Vec<(SqlValue, &str)> = vec![
        (SqlValue::Bool(true), "1"),
        (SqlValue::Bool(false), "0"),
        (SqlValue::Int8(-5), "-5"),
        (SqlValue::UInt8(200), "200"),
        (SqlValue::Int16(-300), "-300"),
        (SqlValue::UInt16(60000), "60000"),
        (SqlValue::Int32(-70000), "-70000"),
        (SqlValue::UInt32(70000), "70000"),
        (SqlValue::Int64(-1), "-1"),
        (SqlValue::UInt64(u64::MAX), "18446744073709551615"),
        (SqlValue::Float(1.5), "1.5"),
        (SqlValue::Double(-2.25), "-2.25"),
        (SqlValue::Text("a@b.com".into()), "a@b.com"),
        (SqlValue::Blob(vec![1, 2, 3]), "BINARY"),
        (SqlValue::Timestamp(timestamp), "2024-01-15 10:30:00.250"),
        (SqlValue::Null, "NULL"),
    ];
    for (value, expected) in cases {
        assert_eq!(value.display_form(), expected, "{value:?}");
    }
}

#[test]
fn catalog_preparation_is_all_or_nothing() {
    test_utils::init_tracing();
    // A catalog referencing a missing table fails to prepare; the pool is
    // closed rather than left half-prepared.
    let catalog = StatementCatalog::builder()
        .statement(
            "select id from nowhere where id = ?",
            &[SqlArgType::Int64],
            ConnectionKind::Sync,
        )
        .build();
    let mut pool = WorkerPool::open(
        ConnectInfo::with_database(unique_db_path("allornothing")),
        catalog,
        1,
        0,
    )
    .expect("open pool");

    assert!(pool.prepare_statements().is_err());
    assert_eq!(pool.sync_connection_count(), 0);
}
