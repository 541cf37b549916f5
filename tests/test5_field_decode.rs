use chrono::NaiveDate;
use sql_workpool::prelude::*;
use sql_workpool::test_utils::{self};
use tempfile::tempdir;

const INS_VALS: StatementId = 0;
const SEL_VALS: StatementId = 1;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

fn vals_catalog() -> StatementCatalog {
    StatementCatalog::builder()
        .statement(
            "insert into vals (i, f, t, b, ts, n) values (?, ?, ?, ?, ?, ?)",
            &[
                SqlArgType::Int64,
                SqlArgType::Double,
                SqlArgType::String,
                SqlArgType::Binary,
                SqlArgType::Timestamp,
                SqlArgType::Int64,
            ],
            ConnectionKind::Both,
        )
        .statement(
            "select i, f, t, b, ts, n from vals order by rowid",
            &[],
            ConnectionKind::Both,
        )
        .build()
}

fn open_vals_pool(prefix: &str) -> WorkerPool {
    test_utils::init_tracing();
    let mut pool = WorkerPool::open(
        ConnectInfo::with_database(unique_db_path(prefix)),
        vals_catalog(),
        1,
        1,
    )
    .expect("open pool");
    pool.sync_execute(
        "create table if not exists vals (i integer, f real, t text, b blob, ts text, n integer)",
    )
    .expect("schema");
    pool.prepare_statements().expect("prepare");
    pool
}

fn timestamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .expect("date")
        .and_hms_milli_opt(10, 30, 0, 250)
        .expect("time")
}

fn seed_row(pool: &WorkerPool) {
    let mut params = pool.statement(INS_VALS);
    params.set(0, 300_i64);
    params.set(1, 2.5_f64);
    params.set(2, "hello");
    params.set(3, vec![0_u8, 255, 7]);
    params.set(4, timestamp());
    params.set_null(5);
    assert_eq!(pool.sync_execute_stmt(params).expect("insert"), 1);
}

#[test]
fn binary_protocol_round_trips_typed_values() {
    let pool = open_vals_pool("binary_roundtrip");
    seed_row(&pool);

    let result = pool
        .sync_query_stmt(pool.statement(SEL_VALS))
        .expect("query")
        .expect("row");
    let row = result.row(0).expect("row 0");

    assert_eq!(row.field(0).get_i64().expect("i64"), 300);
    assert_eq!(row.field(0).get_u16().expect("u16"), 300);
    assert_eq!(row.field(1).get_f64().expect("f64"), 2.5);
    assert_eq!(row.field(1).get_f32().expect("f32"), 2.5);
    assert_eq!(row.field(2).get_str().expect("str"), "hello");
    assert_eq!(row.field(3).get_blob().expect("blob"), &[0, 255, 7]);
    assert_eq!(row.field(4).get_datetime().expect("ts"), timestamp());

    // NULL decodes to the type's default and reports itself.
    assert!(row.field(5).is_null());
    assert_eq!(row.field(5).get_i64().expect("null int"), 0);
    assert_eq!(row.field(5).get_str().expect("null str"), "");
    assert_eq!(row.field(5).get_blob().expect("null blob"), &[] as &[u8]);
}

#[test]
fn narrowing_that_truncates_fails_instead_of_wrapping() {
    let pool = open_vals_pool("truncate");
    seed_row(&pool);

    let result = pool
        .sync_query_stmt(pool.statement(SEL_VALS))
        .expect("query")
        .expect("row");
    let row = result.row(0).expect("row 0");

    // 300 does not fit in u8 (it would wrap to 44); the accessor must fail.
    let err = row.field(0).get_u8().unwrap_err();
    assert!(matches!(err, DbPoolError::FieldDecode(_)));
    // Other fields in the row are unaffected.
    assert_eq!(row.field(0).get_u16().expect("u16"), 300);

    // A fractional real fails integer accessors rather than flooring.
    let err = row.field(1).get_i64().unwrap_err();
    assert!(matches!(err, DbPoolError::FieldDecode(_)));

    // Numeric getters on a blob fail rather than reinterpreting bytes.
    assert!(row.field(3).get_i32().is_err());
}

#[test]
fn text_protocol_parses_cells_from_string_form() {
    let pool = open_vals_pool("text_parse");
    seed_row(&pool);

    let mut result = pool
        .sync_query("select i, f, t from vals")
        .expect("query")
        .expect("rows");
    assert!(result.next_row());

    // Cells travel in string form and parse on access.
    assert!(!result.metadata()[0].binary);
    assert_eq!(result.field(0).get_i64().expect("i64"), 300);
    assert_eq!(result.field(0).get_u16().expect("u16"), 300);
    assert!(result.field(0).get_u8().is_err());
    assert_eq!(result.field(1).get_f64().expect("f64"), 2.5);
    assert_eq!(result.field(2).get_str().expect("str"), "hello");
}

#[test]
fn unsigned_64_bit_values_survive_the_text_detour() {
    let pool = open_vals_pool("u64");

    let mut params = pool.statement(INS_VALS);
    params.set(0, 1_i64);
    params.set(1, 0.0_f64);
    // Bound into a text column so the decimal string survives untouched.
    params.set(2, u64::MAX);
    params.set(3, vec![1_u8]);
    params.set(4, timestamp());
    params.set_null(5);
    pool.sync_execute_stmt(params).expect("insert");

    let result = pool
        .sync_query_stmt(pool.statement(SEL_VALS))
        .expect("query")
        .expect("row");
    let row = result.row(0).expect("row 0");

    // Past i64::MAX the value travels as decimal text; the accessor still
    // returns it exactly, and signed reads fail instead of wrapping.
    assert_eq!(row.field(2).get_u64().expect("u64"), u64::MAX);
    assert!(row.field(2).get_i64().is_err());
}

#[test]
fn bool_accessor_reads_zero_and_one() {
    let pool = open_vals_pool("bool");

    let mut truthy = pool.statement(INS_VALS);
    truthy.set(0, true);
    truthy.set(1, 1.0_f64);
    truthy.set(2, "t");
    truthy.set(3, vec![1_u8]);
    truthy.set(4, timestamp());
    truthy.set(5, 0_i64);
    pool.sync_execute_stmt(truthy).expect("insert");

    let result = pool
        .sync_query_stmt(pool.statement(SEL_VALS))
        .expect("query")
        .expect("row");
    let row = result.row(0).expect("row 0");
    assert!(row.field(0).get_bool().expect("bool"));
    assert!(!row.field(5).get_bool().expect("bool"));
}

#[test]
fn field_count_matches_statement_and_types_match_driver_report() {
    let pool = open_vals_pool("meta");
    seed_row(&pool);

    let result = pool
        .sync_query_stmt(pool.statement(SEL_VALS))
        .expect("query")
        .expect("row");

    assert_eq!(result.field_count(), 6);
    let meta = result.metadata();
    assert_eq!(meta.len(), 6);
    assert_eq!(meta[0].field_type, FieldType::Int64);
    assert_eq!(meta[1].field_type, FieldType::Double);
    assert_eq!(meta[2].field_type, FieldType::Binary);
    assert_eq!(meta[3].field_type, FieldType::Binary);
    assert_eq!(meta[3].type_name, "BLOB");
    assert_eq!(meta[5].field_type, FieldType::Null);
    for (index, m) in meta.iter().enumerate() {
        assert_eq!(m.index as usize, index);
    }

    // Every row reports the statement's field count.
    for row in result.rows() {
        assert_eq!(row.field_count(), 6);
    }
}
