//! Test doubles and fixtures, compiled with the `test-utils` feature.
//!
//! The drivers here wrap the bundled SQLite driver to make failure modes
//! deterministic: [`FlakyDriver`] injects classified connection-loss errors
//! and counts handshakes, [`GateDriver`] lets a test hold queries open so a
//! completion stays pending for as long as the test needs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use crate::catalog::{StatementCatalog, StatementId};
use crate::driver::sqlite::SqliteConnection;
use crate::driver::{Driver, DriverConnection, DriverError, RawResult, SqliteDriver};
use crate::types::{ConnectionKind, SqlArgType, SqlValue};

/// Statement ids for [`account_catalog`].
pub const SEL_ACCOUNT_BY_EMAIL: StatementId = 0;
pub const INS_ACCOUNT: StatementId = 1;
pub const SEL_ACCOUNT_COUNT: StatementId = 2;
pub const SEL_ACCOUNT_INTRO: StatementId = 3;

/// Schema backing [`account_catalog`].
pub const ACCOUNT_SCHEMA: &str = "create table if not exists account (
        id integer primary key,
        name text not null,
        email text not null,
        age integer not null,
        intro blob
    );";

/// The catalog used across the integration tests; `SEL_ACCOUNT_INTRO` is
/// async-only so kind gating is observable.
#[must_use]
pub fn account_catalog() -> StatementCatalog {
    StatementCatalog::builder()
        .statement(
            "select id, name, email, age, intro from account where email = ?",
            &[SqlArgType::String],
            ConnectionKind::Both,
        )
        .statement(
            "insert into account (id, name, email, age, intro) values (?, ?, ?, ?, ?)",
            &[
                SqlArgType::Int64,
                SqlArgType::String,
                SqlArgType::String,
                SqlArgType::UInt8,
                SqlArgType::Binary,
            ],
            ConnectionKind::Both,
        )
        .statement(
            "select count(*) as n from account",
            &[],
            ConnectionKind::Both,
        )
        .statement(
            "select intro from account where email = ?",
            &[SqlArgType::String],
            ConnectionKind::Async,
        )
        .build()
}

/// Install a fmt subscriber once per test binary; respects `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[derive(Default)]
struct FlakyState {
    fail_next: AtomicU32,
    connects: AtomicU32,
}

/// SQLite driver that fails the next N statement calls with a classified
/// connection-loss error and counts handshakes, for exercising the
/// reconnect state machine.
#[derive(Clone, Default)]
pub struct FlakyDriver {
    state: Arc<FlakyState>,
}

impl FlakyDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` statement calls fail with connection loss.
    pub fn fail_next_calls(&self, count: u32) {
        self.state.fail_next.store(count, Ordering::SeqCst);
    }

    /// Handshakes performed so far (1 after open, +1 per reconnect).
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }
}

impl Driver for FlakyDriver {
    type Conn = FlakyConnection;

    fn connect(&self, info: &crate::config::ConnectInfo) -> Result<Self::Conn, DriverError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FlakyConnection {
            inner: SqliteDriver.connect(info)?,
            state: Arc::clone(&self.state),
        })
    }

    fn thread_safe(&self) -> bool {
        true
    }
}

pub struct FlakyConnection {
    inner: SqliteConnection,
    state: Arc<FlakyState>,
}

impl FlakyConnection {
    fn gate(&self) -> Result<(), DriverError> {
        let armed = self
            .state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok();
        if armed {
            Err(DriverError::connection_loss("injected connection loss"))
        } else {
            Ok(())
        }
    }
}

impl DriverConnection for FlakyConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.gate()?;
        self.inner.execute(sql)
    }

    fn query(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        self.gate()?;
        self.inner.query(sql)
    }

    fn prepare(&mut self, sql: &str) -> Result<usize, DriverError> {
        self.inner.prepare(sql)
    }

    fn execute_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        self.gate()?;
        self.inner.execute_prepared(sql, params)
    }

    fn query_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult, DriverError> {
        self.gate()?;
        self.inner.query_prepared(sql, params)
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.inner.ping()
    }

    fn server_version(&self) -> String {
        self.inner.server_version()
    }
}

/// SQLite driver whose query calls block while a test holds the gate,
/// keeping a completion pending deterministically.
#[derive(Clone, Default)]
pub struct GateDriver {
    gate: Arc<Mutex<()>>,
}

impl GateDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold queries at the driver boundary until the guard drops.
    ///
    /// # Panics
    /// Panics when the gate mutex is poisoned.
    #[must_use]
    pub fn hold(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().expect("gate poisoned")
    }
}

impl Driver for GateDriver {
    type Conn = GatedConnection;

    fn connect(&self, info: &crate::config::ConnectInfo) -> Result<Self::Conn, DriverError> {
        Ok(GatedConnection {
            inner: SqliteDriver.connect(info)?,
            gate: Arc::clone(&self.gate),
        })
    }

    fn thread_safe(&self) -> bool {
        true
    }
}

pub struct GatedConnection {
    inner: SqliteConnection,
    gate: Arc<Mutex<()>>,
}

impl GatedConnection {
    fn wait_for_gate(&self) {
        drop(self.gate.lock().expect("gate poisoned"));
    }
}

impl DriverConnection for GatedConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.wait_for_gate();
        self.inner.execute(sql)
    }

    fn query(&mut self, sql: &str) -> Result<RawResult, DriverError> {
        self.wait_for_gate();
        self.inner.query(sql)
    }

    fn prepare(&mut self, sql: &str) -> Result<usize, DriverError> {
        self.inner.prepare(sql)
    }

    fn execute_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        self.wait_for_gate();
        self.inner.execute_prepared(sql, params)
    }

    fn query_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult, DriverError> {
        self.wait_for_gate();
        self.inner.query_prepared(sql, params)
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.inner.ping()
    }

    fn server_version(&self) -> String {
        self.inner.server_version()
    }
}
