use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::catalog::{StatementCatalog, StatementId};
use crate::config::{ConnectInfo, ReconnectPolicy};
use crate::driver::{Driver, DriverConnection, DriverError};
use crate::error::{DbPoolError, ErrorClass, fatal_abort};
use crate::params::ParameterSet;
use crate::results::{PreparedQueryResultSet, QueryResultSet};
use crate::statement::PreparedStatementHandle;
use crate::types::{ConnectionKind, SqlValue};

/// One physical database connection plus its retry/reconnect state machine
/// and prepared-statement registry.
///
/// Sync connections live in the pool behind a try-lock and execute on the
/// calling thread; async connections are moved onto their own worker thread,
/// which makes the statement registry thread-exclusive by construction.
///
/// On a driver error the connection classifies it and either reconnects and
/// retries the same call (connection loss), returns the error (contention,
/// malformed input), or aborts the process (schema defects, exhausted
/// reconnects).
pub struct Connection<D: Driver> {
    driver: D,
    info: Arc<ConnectInfo>,
    kind: ConnectionKind,
    catalog: Arc<StatementCatalog>,
    policy: ReconnectPolicy,
    handle: Option<D::Conn>,
    stmts: Vec<Option<PreparedStatementHandle>>,
    reconnecting: bool,
}

enum Disposition {
    Retry,
    Fail(DriverError),
}

impl<D: Driver> Connection<D> {
    #[must_use]
    pub fn new(
        driver: D,
        info: Arc<ConnectInfo>,
        kind: ConnectionKind,
        catalog: Arc<StatementCatalog>,
        policy: ReconnectPolicy,
    ) -> Self {
        debug!("creating {kind:?} connection to {}", info.database);
        Self {
            driver,
            info,
            kind,
            catalog,
            policy,
            handle: None,
            stmts: Vec::new(),
            reconnecting: false,
        }
    }

    /// Perform the native handshake.
    ///
    /// # Errors
    /// Propagates the driver's classified handshake error.
    pub fn open(&mut self) -> Result<(), DbPoolError> {
        match self.driver.connect(&self.info) {
            Ok(conn) => {
                if !self.reconnecting {
                    info!(
                        "connected to {}: {}",
                        self.info.database,
                        conn.server_version()
                    );
                }
                self.handle = Some(conn);
                Ok(())
            }
            Err(err) => {
                error!(
                    "failed to connect to {} [host:{} port:{} user:{}]: {err}",
                    self.info.database, self.info.host, self.info.port, self.info.user
                );
                Err(err.into())
            }
        }
    }

    pub fn close(&mut self) {
        debug!("closing connection to {}", self.info.database);
        self.stmts.clear();
        self.handle = None;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    #[must_use]
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Prepare every catalog statement whose kind intersects this
    /// connection's kind. A catalog entry whose declared argument count
    /// disagrees with what the driver reports is a fatal mismatch.
    ///
    /// # Errors
    /// Returns an error when any applicable statement fails to compile; the
    /// pool treats that as all-or-nothing.
    pub fn prepare_statements(&mut self) -> Result<(), DbPoolError> {
        let catalog = Arc::clone(&self.catalog);
        self.stmts = (0..catalog.len()).map(|_| None).collect();

        let mut prepare_error = false;
        for (id, def) in catalog.defs().iter().enumerate() {
            if !self.kind.intersects(def.kind) {
                continue;
            }

            let Some(handle) = self.handle.as_mut() else {
                return Err(DbPoolError::ConnectionError(
                    "cannot prepare statements on a closed connection".into(),
                ));
            };

            match handle.prepare(&def.sql) {
                Ok(reported) => {
                    if reported != def.args.len() {
                        fatal_abort(&format!(
                            "statement {id} declares {} arguments but the driver reports {reported}: {}",
                            def.args.len(),
                            def.sql
                        ));
                    }
                    assert!(reported < usize::from(u8::MAX));
                    self.stmts[id] = Some(PreparedStatementHandle::new(
                        id as StatementId,
                        Arc::from(def.sql.as_str()),
                        reported,
                    ));
                }
                Err(err) => {
                    error!("failed to prepare statement {id} ({}): {err}", def.sql);
                    prepare_error = true;
                }
            }
        }

        if prepare_error {
            Err(DbPoolError::ExecutionError(
                "statement preparation failed".into(),
            ))
        } else {
            Ok(())
        }
    }

    /// Per-id parameter counts of the statements prepared here; 0 for ids
    /// this connection did not prepare.
    pub(crate) fn statement_param_counts(&self) -> Vec<u8> {
        self.stmts
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .map_or(0, |stmt| stmt.parameter_count() as u8)
            })
            .collect()
    }

    /// Run a raw statement, reporting rows affected.
    ///
    /// # Errors
    /// Returns contention and malformed-input errors; connection loss is
    /// retried internally after reconnecting.
    pub fn execute(&mut self, sql: &str) -> Result<u64, DbPoolError> {
        loop {
            let result = match self.handle.as_mut() {
                Some(handle) => handle.execute(sql),
                None => {
                    return Err(DbPoolError::ConnectionError(
                        "connection is not open".into(),
                    ));
                }
            };

            match result {
                Ok(affected) => return Ok(affected),
                Err(err) => {
                    error!("execute failed: {sql}: {err}");
                    match self.disposition(err) {
                        Disposition::Retry => {}
                        Disposition::Fail(err) => return Err(err.into()),
                    }
                }
            }
        }
    }

    /// Run a raw-SQL query through the text protocol. `Ok(None)` for empty
    /// results.
    ///
    /// # Errors
    /// Returns contention and malformed-input errors; connection loss is
    /// retried internally after reconnecting.
    pub fn query(&mut self, sql: &str) -> Result<Option<QueryResultSet>, DbPoolError> {
        if sql.trim().is_empty() {
            return Ok(None);
        }

        loop {
            let result = match self.handle.as_mut() {
                Some(handle) => handle.query(sql),
                None => {
                    return Err(DbPoolError::ConnectionError(
                        "connection is not open".into(),
                    ));
                }
            };

            match result {
                Ok(raw) => {
                    if raw.rows.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(QueryResultSet::new(raw)));
                }
                Err(err) => {
                    error!("query failed: {sql}: {err}");
                    match self.disposition(err) {
                        Disposition::Retry => {}
                        Disposition::Fail(err) => return Err(err.into()),
                    }
                }
            }
        }
    }

    /// Bind `params` into the prepared statement it names and execute it.
    ///
    /// # Panics
    /// Panics when the statement id lies outside the prepared registry, a
    /// caller bug, not a runtime condition.
    ///
    /// # Errors
    /// Returns contention and malformed-input errors; connection loss is
    /// retried internally (rebinding included) after reconnecting.
    pub fn execute_stmt(&mut self, params: &ParameterSet) -> Result<u64, DbPoolError> {
        loop {
            let result =
                self.run_prepared(params, <D::Conn as DriverConnection>::execute_prepared)?;
            match result {
                Ok(affected) => return Ok(affected),
                Err(err) => {
                    error!("prepared execute failed (statement {}): {err}", params.statement_id());
                    match self.disposition(err) {
                        Disposition::Retry => {}
                        Disposition::Fail(err) => return Err(err.into()),
                    }
                }
            }
        }
    }

    /// Bind `params` into the prepared statement it names and query through
    /// the binary protocol. `Ok(None)` for empty results.
    ///
    /// # Panics
    /// Panics when the statement id lies outside the prepared registry.
    ///
    /// # Errors
    /// Returns contention and malformed-input errors; connection loss is
    /// retried internally (rebinding included) after reconnecting.
    pub fn query_stmt(
        &mut self,
        params: &ParameterSet,
    ) -> Result<Option<PreparedQueryResultSet>, DbPoolError> {
        loop {
            let result =
                self.run_prepared(params, <D::Conn as DriverConnection>::query_prepared)?;
            match result {
                Ok(raw) => {
                    if raw.rows.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(PreparedQueryResultSet::new(raw)));
                }
                Err(err) => {
                    error!("prepared query failed (statement {}): {err}", params.statement_id());
                    match self.disposition(err) {
                        Disposition::Retry => {}
                        Disposition::Fail(err) => return Err(err.into()),
                    }
                }
            }
        }
    }

    /// One bind-execute-clear cycle against the statement registry. The
    /// bind buffers are cleared whether the driver call succeeded or not.
    fn run_prepared<T>(
        &mut self,
        params: &ParameterSet,
        op: impl FnOnce(&mut D::Conn, &str, &[SqlValue]) -> Result<T, DriverError>,
    ) -> Result<Result<T, DriverError>, DbPoolError> {
        let id = params.statement_id() as usize;
        assert!(
            id < self.stmts.len(),
            "statement id {id} outside the prepared registry (size {}) for {} ({:?})",
            self.stmts.len(),
            self.info.database,
            self.kind
        );

        let Some(stmt) = self.stmts[id].as_mut() else {
            error!(
                "statement {id} is not prepared on this {:?} connection to {}",
                self.kind, self.info.database
            );
            return Err(DbPoolError::ExecutionError(format!(
                "statement {id} not prepared for this connection kind"
            )));
        };

        stmt.bind_parameters(params);
        debug!("executing: {}", stmt.render_sql());
        let sql = stmt.sql_arc();
        let values = stmt.bound_values();

        let result = match self.handle.as_mut() {
            Some(handle) => op(handle, &sql, &values),
            None => Err(DriverError::connection_loss("connection is not open")),
        };

        stmt.clear_parameters();
        Ok(result)
    }

    /// Keep-alive check; failures are left to the next real call to
    /// classify.
    pub fn ping(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(err) = handle.ping() {
                warn!("ping failed for {}: {err}", self.info.database);
            }
        }
    }

    /// # Errors
    /// Propagates execution errors from the underlying statement.
    pub fn begin_transaction(&mut self) -> Result<(), DbPoolError> {
        self.execute("BEGIN").map(|_| ())
    }

    /// # Errors
    /// Propagates execution errors from the underlying statement.
    pub fn commit_transaction(&mut self) -> Result<(), DbPoolError> {
        self.execute("COMMIT").map(|_| ())
    }

    /// # Errors
    /// Propagates execution errors from the underlying statement.
    pub fn rollback_transaction(&mut self) -> Result<(), DbPoolError> {
        self.execute("ROLLBACK").map(|_| ())
    }

    fn disposition(&mut self, err: DriverError) -> Disposition {
        match err.class {
            ErrorClass::ConnectionLoss => {
                self.reconnect();
                Disposition::Retry
            }
            ErrorClass::SchemaDefect => {
                fatal_abort(&format!("database schema no longer matches this binary: {err}"))
            }
            _ => Disposition::Fail(err),
        }
    }

    /// Close the dead handle, reopen, re-prepare. Either succeeds within the
    /// policy bounds or takes the process down; a connection is never left
    /// spinning on a dead handle.
    fn reconnect(&mut self) {
        self.reconnecting = true;
        warn!("connection to {} lost; reconnecting", self.info.database);
        self.handle = None;

        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            match self.open() {
                Ok(()) => {
                    if self.prepare_statements().is_err() {
                        fatal_abort("statement preparation failed after reconnect");
                    }
                    info!(
                        "reconnected to {} @{}:{} ({:?})",
                        self.info.database, self.info.host, self.info.port, self.kind
                    );
                    self.reconnecting = false;
                    return;
                }
                Err(err) => {
                    warn!("reconnect attempt {attempt}/{max} failed: {err}");
                    if attempt < max {
                        std::thread::sleep(self.policy.delay);
                    }
                }
            }
        }

        fatal_abort(&format!(
            "could not reconnect to {} after {max} attempts",
            self.info.database
        ));
    }
}
