//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types to make it easier to
//! get started with the library.

pub use crate::callback::{CallbackProcessor, Pending, QueryCallback};
pub use crate::catalog::{CatalogBuilder, StatementCatalog, StatementDef, StatementId};
pub use crate::config::{ConnectInfo, ReconnectPolicy};
pub use crate::connection::Connection;
pub use crate::driver::{Driver, DriverConnection, DriverError, SqliteDriver};
pub use crate::error::{DbPoolError, ErrorClass};
pub use crate::field::{Field, FieldMetadata, FieldType};
pub use crate::params::ParameterSet;
pub use crate::pool::WorkerPool;
pub use crate::results::{PreparedQueryResultSet, QueryResultSet, Row};
pub use crate::types::{ConnectionKind, SqlArgType, SqlValue};
