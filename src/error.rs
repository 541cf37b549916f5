use std::time::Duration;

use thiserror::Error;

use crate::driver::DriverError;

/// What the pool should do about a driver error.
///
/// Classification happens at the driver boundary (each driver maps its own
/// native codes); the connection state machine only acts on the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Peer gone, handle unusable. Recoverable: reconnect, then retry the
    /// original call.
    ConnectionLoss,
    /// Lock/deadlock conflict. Returned to the caller, who decides whether
    /// to resubmit.
    Contention,
    /// Bad input (constraint violation, wrong value count, duplicate key).
    /// Returned to the caller, no retry.
    MalformedQuery,
    /// Unknown table/column or syntax error: the running binary no longer
    /// matches the schema. Fatal; the process aborts.
    SchemaDefect,
    /// Anything the driver could not map.
    Unclassified,
}

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Field decode error: {0}")]
    FieldDecode(String),
}

impl DbPoolError {
    /// The driver-assigned class, when this error came over the driver
    /// boundary.
    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Driver(err) => Some(err.class),
            _ => None,
        }
    }
}

const FATAL_ABORT_DELAY: Duration = Duration::from_secs(10);

/// Deliberate fail-fast for schema drift and exhausted reconnects: log,
/// give log sinks a moment to flush, abort.
pub(crate) fn fatal_abort(reason: &str) -> ! {
    tracing::error!("fatal database error: {reason}; aborting in {FATAL_ABORT_DELAY:?}");
    std::thread::sleep(FATAL_ABORT_DELAY);
    std::process::abort();
}
