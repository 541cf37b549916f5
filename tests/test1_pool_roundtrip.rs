use sql_workpool::prelude::*;
use sql_workpool::test_utils::{
    self, ACCOUNT_SCHEMA, INS_ACCOUNT, SEL_ACCOUNT_BY_EMAIL, SEL_ACCOUNT_COUNT, SEL_ACCOUNT_INTRO,
};
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

fn open_pool(prefix: &str, sync_count: u8, async_count: u8) -> WorkerPool {
    test_utils::init_tracing();
    let mut pool = WorkerPool::open(
        ConnectInfo::with_database(unique_db_path(prefix)),
        test_utils::account_catalog(),
        sync_count,
        async_count,
    )
    .expect("open pool");
    pool.sync_execute(ACCOUNT_SCHEMA).expect("schema");
    pool.prepare_statements().expect("prepare");
    pool
}

fn insert_account(pool: &WorkerPool, id: i64, name: &str, email: &str, age: u8) {
    let mut params = pool.statement(INS_ACCOUNT);
    params.set(0, id);
    params.set(1, name);
    params.set(2, email);
    params.set(3, age);
    params.set(4, name.as_bytes());
    assert_eq!(pool.sync_execute_stmt(params).expect("insert"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prepared_sync_query_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool("roundtrip", 1, 1);
    assert_eq!(pool.sync_connection_count(), 1);
    assert_eq!(pool.async_connection_count(), 1);

    insert_account(&pool, 1, "alice", "a@b.com", 30);

    let mut params = pool.statement(SEL_ACCOUNT_BY_EMAIL);
    assert_eq!(params.capacity(), 1);
    params.set(0, "a@b.com");

    let result = pool.sync_query_stmt(params)?.expect("one row");
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.field_count(), 5);

    // Positioned on the first row at construction.
    assert_eq!(result.field(0).get_i64()?, 1);
    assert_eq!(result.field(1).get_str()?, "alice");
    assert_eq!(result.field(2).get_str()?, "a@b.com");
    assert_eq!(result.field(3).get_u8()?, 30);
    assert_eq!(result.field(4).get_blob()?, b"alice");

    // Driver-reported metadata agrees with the schema.
    let meta = result.metadata();
    assert!(meta.iter().all(|m| m.binary));
    assert_eq!(meta[0].field_type, FieldType::Int64);
    assert_eq!(meta[0].type_name, "INTEGER");
    assert_eq!(meta[2].field_type, FieldType::Binary);
    assert_eq!(meta[2].alias, "email");

    // A row reference from the eager result stays valid alongside others.
    let first = result.row(0).expect("row 0");
    assert_eq!(first.field(1).get_string()?, "alice");

    // Missing email comes back as the empty sentinel.
    let mut missing = pool.statement(SEL_ACCOUNT_BY_EMAIL);
    missing.set(0, "nobody@b.com");
    assert!(pool.sync_query_stmt(missing)?.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn raw_query_iterates_through_reused_row_buffer() -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool("text_rows", 1, 1);
    for (id, name, email) in [(1, "a", "a@x.com"), (2, "b", "b@x.com"), (3, "c", "c@x.com")] {
        insert_account(&pool, id, name, email, 20);
    }

    let mut result = pool
        .sync_query("select id, name from account order by id")?
        .expect("rows");
    assert_eq!(result.row_count(), 3);
    assert_eq!(result.field_count(), 2);

    // Not positioned until the first next_row.
    assert!(result.current().is_none());

    let mut seen = Vec::new();
    while result.next_row() {
        let row = result.current().expect("current row");
        seen.push((row.field(0).get_i64()?, row.field(1).get_string()?));
    }
    assert_eq!(
        seen,
        vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]
    );
    assert!(result.current().is_none());

    // Text protocol: metadata says cells travel in string form.
    assert!(result.metadata().iter().all(|m| !m.binary));

    // Zero-row raw queries surface as the empty sentinel.
    assert!(pool.sync_query("select id from account where id = 999")?.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn awaited_mode_runs_on_worker_connections() -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool("awaited", 1, 2);
    insert_account(&pool, 1, "alice", "a@b.com", 30);

    // Raw awaited query.
    let mut rows = pool
        .query("select email from account order by id")
        .await?
        .expect("rows");
    assert!(rows.next_row());
    assert_eq!(rows.field(0).get_str()?, "a@b.com");

    // Prepared awaited query on an async connection; the async-only
    // statement is prepared there.
    let mut params = pool.statement(SEL_ACCOUNT_INTRO);
    params.set(0, "a@b.com");
    let result = pool.query_stmt(params).await?.expect("row");
    assert_eq!(result.field(0).get_blob()?, b"alice");

    // Awaited execute reports rows affected.
    let affected = pool
        .execute("update account set age = 31 where id = 1")
        .await?;
    assert_eq!(affected, 1);

    let count_params = pool.statement(SEL_ACCOUNT_COUNT);
    assert_eq!(count_params.capacity(), 0);
    let count = pool.query_stmt(count_params).await?.expect("count row");
    assert_eq!(count.field(0).get_i64()?, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn statement_kind_gates_preparation() -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool("kinds", 1, 1);
    insert_account(&pool, 1, "alice", "a@b.com", 30);

    // SEL_ACCOUNT_INTRO is async-only; a sync connection never prepared it.
    let mut params = pool.statement(SEL_ACCOUNT_INTRO);
    params.set(0, "a@b.com");
    let err = pool.sync_query_stmt(params).unwrap_err();
    assert!(err.to_string().contains("not prepared"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transactions_roll_back_on_a_sync_connection() -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool("txn", 1, 1);

    pool.with_sync_connection(|conn| -> Result<(), DbPoolError> {
        conn.begin_transaction()?;
        conn.execute("insert into account (id, name, email, age) values (1, 'x', 'x@y.com', 1)")?;
        conn.rollback_transaction()?;
        Ok(())
    })??;

    assert!(pool.sync_query("select id from account")?.is_none());

    pool.with_sync_connection(|conn| -> Result<(), DbPoolError> {
        conn.begin_transaction()?;
        conn.execute("insert into account (id, name, email, age) values (2, 'y', 'y@z.com', 2)")?;
        conn.commit_transaction()?;
        Ok(())
    })??;

    let mut rows = pool.sync_query("select id from account")?.expect("rows");
    assert!(rows.next_row());
    assert_eq!(rows.field(0).get_i64()?, 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_stops_workers_and_drops_connections() {
    let mut pool = open_pool("close", 1, 2);
    pool.ping();
    pool.close();
    assert_eq!(pool.sync_connection_count(), 0);
    assert_eq!(pool.async_connection_count(), 0);
    assert!(pool.sync_query("select 1").is_err());
}
