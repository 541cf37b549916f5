//! The driver boundary: the only I/O surface of the crate.
//!
//! A driver models a synchronous, blocking native client API. The pool never
//! runs these calls on a thread the application is awaiting on; async
//! connections move their driver handle onto a dedicated worker thread.
//! Any driver with these operations can back the pool; the bundled
//! [`SqliteDriver`] is the reference implementation.

pub mod sqlite;

pub use sqlite::SqliteDriver;

use thiserror::Error;

use crate::config::ConnectInfo;
use crate::error::ErrorClass;
use crate::field::FieldMetadata;
use crate::types::SqlValue;

/// A native driver error, already classified for the connection state
/// machine. Each driver maps its own native codes to [`ErrorClass`].
#[derive(Debug, Clone, Error)]
#[error("{message} [native code {code}]")]
pub struct DriverError {
    pub class: ErrorClass,
    pub code: i32,
    pub message: String,
}

impl DriverError {
    #[must_use]
    pub fn new(class: ErrorClass, code: i32, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
        }
    }

    /// A connection-loss error with no meaningful native code.
    #[must_use]
    pub fn connection_loss(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::ConnectionLoss, -1, message)
    }
}

/// Everything one query produced: column metadata and fully fetched rows.
///
/// Text-protocol queries deliver cells in string form; prepared (binary
/// protocol) queries deliver native values. `columns[i].binary` records
/// which.
#[derive(Debug)]
pub struct RawResult {
    pub columns: Vec<FieldMetadata>,
    pub rows: Vec<Vec<SqlValue>>,
    pub affected: u64,
}

/// One open native connection. Calls block; closing happens on drop.
pub trait DriverConnection: Send {
    /// Run a statement (or batch) that returns no rows; reports rows
    /// affected.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] on native failure.
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Run a raw-SQL query through the text protocol.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] on native failure.
    fn query(&mut self, sql: &str) -> Result<RawResult, DriverError>;

    /// Compile (and cache) a statement; reports the parameter count the
    /// native side sees.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] when compilation fails.
    fn prepare(&mut self, sql: &str) -> Result<usize, DriverError>;

    /// Bind and run a prepared statement that returns no rows.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] on native failure.
    fn execute_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError>;

    /// Bind and run a prepared query through the binary protocol.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] on native failure.
    fn query_prepared(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult, DriverError>;

    /// Cheap liveness check.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] when the handle is dead.
    fn ping(&mut self) -> Result<(), DriverError>;

    /// Driver/server version string, logged once per pool.
    fn server_version(&self) -> String;
}

/// Factory for native connections. Cloned into every connection so the
/// reconnect state machine can reopen without reaching back into the pool.
pub trait Driver: Clone + Send + Sync + 'static {
    type Conn: DriverConnection + 'static;

    /// Perform the native handshake.
    ///
    /// # Errors
    /// Returns a classified [`DriverError`] when the handshake fails.
    fn connect(&self, info: &ConnectInfo) -> Result<Self::Conn, DriverError>;

    /// Whether the native client library may be used from multiple threads.
    /// The pool refuses to open otherwise.
    fn thread_safe(&self) -> bool;
}
