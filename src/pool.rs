use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::callback::{Pending, QueryCallback};
use crate::catalog::{StatementCatalog, StatementId};
use crate::config::{ConnectInfo, ReconnectPolicy};
use crate::connection::Connection;
use crate::driver::{Driver, SqliteDriver};
use crate::error::DbPoolError;
use crate::params::ParameterSet;
use crate::results::{PreparedQueryResultSet, QueryResultSet};
use crate::types::ConnectionKind;
use crate::worker::WorkerHandle;

/// Pooled, type-checked access to one logical database in three execution
/// modes.
///
/// The pool owns two disjoint sets of connections: sync connections execute
/// on the calling thread, picked round-robin with a try-lock so a busy
/// connection is skipped rather than waited on; async connections each own a
/// dedicated worker thread, and work goes to the one with the fewest
/// outstanding tasks. Queries submitted to the same async connection
/// complete in submission order; across connections there is no ordering
/// guarantee.
///
/// ```rust,no_run
/// use sql_workpool::prelude::*;
///
/// const SEL_ACCOUNT_BY_EMAIL: StatementId = 0;
///
/// # fn demo() -> Result<(), DbPoolError> {
/// let catalog = StatementCatalog::builder()
///     .statement(
///         "select id, name, email from account where email = ?",
///         &[SqlArgType::String],
///         ConnectionKind::Both,
///     )
///     .build();
///
/// let mut pool = WorkerPool::open(ConnectInfo::with_database("app.db"), catalog, 1, 1)?;
/// pool.prepare_statements()?;
///
/// let mut params = pool.statement(SEL_ACCOUNT_BY_EMAIL);
/// params.set(0, "a@b.com");
/// if let Some(result) = pool.sync_query_stmt(params)? {
///     println!("name: {}", result.field(1).get_string()?);
/// }
/// # Ok(()) }
/// ```
pub struct WorkerPool<D: Driver = SqliteDriver> {
    info: Arc<ConnectInfo>,
    catalog: Arc<StatementCatalog>,
    sync_connections: Vec<Mutex<Connection<D>>>,
    workers: Vec<WorkerHandle>,
    param_counts: Vec<u8>,
    round_robin: AtomicUsize,
}

impl WorkerPool<SqliteDriver> {
    /// Open a pool over the bundled SQLite driver with the default
    /// reconnect policy.
    ///
    /// # Errors
    /// Returns the first connection failure; partially opened pools are torn
    /// down.
    pub fn open(
        info: ConnectInfo,
        catalog: StatementCatalog,
        sync_count: u8,
        async_count: u8,
    ) -> Result<Self, DbPoolError> {
        Self::open_with(
            SqliteDriver,
            info,
            catalog,
            ReconnectPolicy::default(),
            sync_count,
            async_count,
        )
    }
}

impl<D: Driver> WorkerPool<D> {
    /// Open `sync_count` sync and `async_count` async connections, starting
    /// one worker thread per async connection.
    ///
    /// # Panics
    /// Panics when the driver reports it is not thread safe.
    ///
    /// # Errors
    /// Returns the first connection failure; partially opened pools are torn
    /// down (connections already opened are dropped, workers already started
    /// are told to stop).
    pub fn open_with(
        driver: D,
        info: ConnectInfo,
        catalog: StatementCatalog,
        policy: ReconnectPolicy,
        sync_count: u8,
        async_count: u8,
    ) -> Result<Self, DbPoolError> {
        assert!(
            driver.thread_safe(),
            "database driver reports it is not thread safe"
        );

        let info = Arc::new(info);
        let catalog = Arc::new(catalog);
        info!(
            "connecting to {}: {sync_count} sync, {async_count} async connections",
            info.database
        );

        let mut async_connections = Vec::with_capacity(usize::from(async_count));
        for _ in 0..async_count {
            let mut connection = Connection::new(
                driver.clone(),
                Arc::clone(&info),
                ConnectionKind::Async,
                Arc::clone(&catalog),
                policy,
            );
            connection.open()?;
            async_connections.push(connection);
        }

        let mut sync_connections = Vec::with_capacity(usize::from(sync_count));
        for _ in 0..sync_count {
            let mut connection = Connection::new(
                driver.clone(),
                Arc::clone(&info),
                ConnectionKind::Sync,
                Arc::clone(&catalog),
                policy,
            );
            connection.open()?;
            sync_connections.push(Mutex::new(connection));
        }

        let workers = async_connections
            .into_iter()
            .enumerate()
            .map(|(index, connection)| WorkerHandle::spawn(index, connection))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "database pool connected: {} ({} connections)",
            info.database,
            sync_connections.len() + workers.len()
        );

        Ok(Self {
            info,
            catalog,
            sync_connections,
            workers,
            param_counts: Vec::new(),
            round_robin: AtomicUsize::new(0),
        })
    }

    /// Prepare every catalog statement on every connection it applies to,
    /// and build the shared statement-id → parameter-count table.
    ///
    /// All-or-nothing: the first preparation failure closes the whole pool
    /// and is returned.
    ///
    /// # Errors
    /// Returns the first preparation failure.
    pub fn prepare_statements(&mut self) -> Result<(), DbPoolError> {
        let mut counts = vec![0u8; self.catalog.len()];
        let mut failure = None;

        for worker in &self.workers {
            match worker.prepare_statements() {
                Ok(worker_counts) => merge_param_counts(&mut counts, &worker_counts),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if failure.is_none() {
            for connection in &self.sync_connections {
                let mut guard = connection.lock();
                match guard.prepare_statements() {
                    Ok(()) => merge_param_counts(&mut counts, &guard.statement_param_counts()),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }

        if let Some(err) = failure {
            error!("statement preparation failed; closing pool: {err}");
            self.close();
            return Err(err);
        }

        self.param_counts = counts;
        info!(
            "prepared {} statements for {}",
            self.catalog.len(),
            self.info.database
        );
        Ok(())
    }

    /// A detached [`ParameterSet`] for statement `id`, sized from the shared
    /// parameter-count table.
    ///
    /// # Panics
    /// Panics when `id` lies outside the catalog, a caller bug rather than a
    /// runtime condition.
    #[must_use]
    pub fn statement(&self, id: StatementId) -> ParameterSet {
        assert!(
            (id as usize) < self.catalog.len(),
            "statement id {id} out of range (catalog size {})",
            self.catalog.len()
        );
        let capacity = self.param_counts.get(id as usize).copied().unwrap_or(0);
        ParameterSet::new(id, usize::from(capacity))
    }

    /// Run a raw statement on a free sync connection, blocking the caller.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub fn sync_execute(&self, sql: &str) -> Result<u64, DbPoolError> {
        if sql.is_empty() {
            return Ok(0);
        }
        self.with_free_connection(|connection| connection.execute(sql))?
    }

    /// Run a prepared statement on a free sync connection, blocking the
    /// caller.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub fn sync_execute_stmt(&self, params: ParameterSet) -> Result<u64, DbPoolError> {
        self.with_free_connection(|connection| connection.execute_stmt(&params))?
    }

    /// Run a raw-SQL query on a free sync connection, blocking the caller.
    /// `Ok(None)` for empty results.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub fn sync_query(&self, sql: &str) -> Result<Option<QueryResultSet>, DbPoolError> {
        if sql.is_empty() {
            return Ok(None);
        }
        self.with_free_connection(|connection| connection.query(sql))?
    }

    /// Run a prepared query on a free sync connection, blocking the caller.
    /// `Ok(None)` for empty results.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub fn sync_query_stmt(
        &self,
        params: ParameterSet,
    ) -> Result<Option<PreparedQueryResultSet>, DbPoolError> {
        self.with_free_connection(|connection| connection.query_stmt(&params))?
    }

    /// Fire-and-forget: run a raw statement on the least-loaded async
    /// connection. Failures are logged on the worker.
    pub fn async_execute(&self, sql: &str) {
        if sql.is_empty() {
            return;
        }
        match self.least_loaded() {
            Some(worker) => worker.fire_execute(sql.to_owned()),
            None => error!("async execute dropped: pool has no async connections"),
        }
    }

    /// Fire-and-forget: run a prepared statement on the least-loaded async
    /// connection. Failures are logged on the worker.
    pub fn async_execute_stmt(&self, params: ParameterSet) {
        match self.least_loaded() {
            Some(worker) => worker.fire_execute_stmt(params),
            None => error!("async execute dropped: pool has no async connections"),
        }
    }

    /// Submit a raw-SQL query to the least-loaded async connection and
    /// return immediately with a completion token.
    #[must_use]
    pub fn async_query(&self, sql: &str) -> QueryCallback {
        match self.least_loaded() {
            Some(worker) => QueryCallback::from_query(worker.submit_query(sql.to_owned())),
            None => {
                error!("async query dropped: pool has no async connections");
                QueryCallback::from_query(Pending::closed())
            }
        }
    }

    /// Submit a prepared query to the least-loaded async connection and
    /// return immediately with a completion token.
    #[must_use]
    pub fn async_query_stmt(&self, params: ParameterSet) -> QueryCallback {
        match self.least_loaded() {
            Some(worker) => QueryCallback::from_prepared(worker.submit_query_stmt(params)),
            None => {
                error!("async query dropped: pool has no async connections");
                QueryCallback::from_prepared(Pending::closed())
            }
        }
    }

    /// Run a raw statement on an async connection, suspending the calling
    /// task until the native call completes.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub async fn execute(&self, sql: &str) -> Result<u64, DbPoolError> {
        let worker = self.least_loaded().ok_or_else(no_async_connections)?;
        worker.submit_execute(sql.to_owned()).recv().await?
    }

    /// Run a prepared statement on an async connection, suspending the
    /// calling task until the native call completes.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub async fn execute_stmt(&self, params: ParameterSet) -> Result<u64, DbPoolError> {
        let worker = self.least_loaded().ok_or_else(no_async_connections)?;
        worker.submit_execute_stmt(params).recv().await?
    }

    /// Run a raw-SQL query on an async connection, suspending the calling
    /// task until the native call completes. `Ok(None)` for empty results.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub async fn query(&self, sql: &str) -> Result<Option<QueryResultSet>, DbPoolError> {
        let worker = self.least_loaded().ok_or_else(no_async_connections)?;
        worker.submit_query(sql.to_owned()).recv().await?
    }

    /// Run a prepared query on an async connection, suspending the calling
    /// task until the native call completes. `Ok(None)` for empty results.
    ///
    /// # Errors
    /// Propagates connection and execution errors.
    pub async fn query_stmt(
        &self,
        params: ParameterSet,
    ) -> Result<Option<PreparedQueryResultSet>, DbPoolError> {
        let worker = self.least_loaded().ok_or_else(no_async_connections)?;
        worker.submit_query_stmt(params).recv().await?
    }

    /// Run caller-supplied work on a free sync connection (transactions,
    /// batches, anything the one-shot API doesn't cover).
    ///
    /// # Errors
    /// Fails when the pool has no sync connections.
    pub fn with_sync_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection<D>) -> T,
    ) -> Result<T, DbPoolError> {
        self.with_free_connection(f)
    }

    /// Keep-alive across the pool: queued on every worker, run inline on
    /// every currently free sync connection.
    pub fn ping(&self) {
        for worker in &self.workers {
            worker.fire_ping();
        }
        for connection in &self.sync_connections {
            if let Some(mut guard) = connection.try_lock() {
                guard.ping();
            }
        }
    }

    #[must_use]
    pub fn sync_connection_count(&self) -> usize {
        self.sync_connections.len()
    }

    #[must_use]
    pub fn async_connection_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker thread (waiting for each) and close every
    /// connection.
    pub fn close(&mut self) {
        info!("closing database pool: {}", self.info.database);
        for worker in &mut self.workers {
            worker.shutdown();
        }
        self.workers.clear();
        for connection in &self.sync_connections {
            connection.lock().close();
        }
        self.sync_connections.clear();
    }

    /// Round-robin over the sync connections, skipping any that is busy,
    /// wrapping around until one is free. Never blocks on a specific
    /// connection.
    fn with_free_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection<D>) -> T,
    ) -> Result<T, DbPoolError> {
        if self.sync_connections.is_empty() {
            return Err(DbPoolError::ConfigError(
                "pool has no sync connections".into(),
            ));
        }

        let start = self.round_robin.fetch_add(1, Ordering::Relaxed);
        loop {
            for offset in 0..self.sync_connections.len() {
                let connection =
                    &self.sync_connections[(start + offset) % self.sync_connections.len()];
                if let Some(mut guard) = connection.try_lock() {
                    return Ok(f(&mut guard));
                }
            }
            std::thread::yield_now();
        }
    }

    fn least_loaded(&self) -> Option<&WorkerHandle> {
        self.workers
            .iter()
            .min_by_key(|worker| worker.pending_tasks())
    }
}

fn merge_param_counts(into: &mut [u8], from: &[u8]) {
    for (slot, count) in into.iter_mut().zip(from) {
        if *slot == 0 {
            *slot = *count;
        }
    }
}

fn no_async_connections() -> DbPoolError {
    DbPoolError::ConfigError("pool has no async connections".into())
}
