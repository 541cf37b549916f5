//! Pooled, type-checked SQL access with three execution modes.
//!
//! A [`WorkerPool`] owns two disjoint sets of database connections over one
//! blocking native driver:
//!
//! - **Blocking** (`sync_*`): executes on the calling thread, picking a free
//!   sync connection round-robin with a try-lock.
//! - **Deferred** (`async_*`): enqueues onto the least-loaded async
//!   connection's dedicated worker thread and returns a [`QueryCallback`];
//!   the application drains ready callbacks once per tick through a
//!   [`CallbackProcessor`], so continuations never race a worker.
//! - **Awaited** ([`WorkerPool::query`] and friends): same submission,
//!   suspends the calling task until the native call completes.
//!
//! Statements live in a [`StatementCatalog`] built once at startup; each
//! connection prepares the entries matching its [`ConnectionKind`], and
//! [`WorkerPool::statement`] hands out [`ParameterSet`]s sized from the
//! shared parameter-count table. Connection loss is classified at the driver
//! boundary and handled by a bounded reconnect-and-retry state machine;
//! schema drift is a deliberate fail-fast abort.

pub mod callback;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod field;
pub mod params;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod statement;
pub mod types;

mod connection;
mod worker;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use callback::{CallbackProcessor, Pending, QueryCallback};
pub use catalog::{CatalogBuilder, StatementCatalog, StatementDef, StatementId};
pub use config::{ConnectInfo, ReconnectPolicy};
pub use connection::Connection;
pub use driver::{Driver, DriverConnection, DriverError, RawResult, SqliteDriver};
pub use error::{DbPoolError, ErrorClass};
pub use field::{Field, FieldMetadata, FieldType};
pub use params::ParameterSet;
pub use pool::WorkerPool;
pub use results::{PreparedQueryResultSet, QueryResultSet, Row};
pub use statement::PreparedStatementHandle;
pub use types::{ConnectionKind, SqlArgType, SqlValue};
