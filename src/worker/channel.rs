use std::sync::mpsc as std_mpsc;

use tokio::sync::oneshot;

use crate::error::DbPoolError;
use crate::params::ParameterSet;
use crate::results::{PreparedQueryResultSet, QueryResultSet};

/// Work items drained by a connection's worker thread, strictly in
/// submission order.
///
/// `respond_to: None` on the execute variants is the fire-and-forget path.
/// Statement preparation answers over a std channel so pool bootstrap can
/// block on it from any context.
pub(crate) enum Command {
    Execute {
        sql: String,
        respond_to: Option<oneshot::Sender<Result<u64, DbPoolError>>>,
    },
    ExecuteStmt {
        params: ParameterSet,
        respond_to: Option<oneshot::Sender<Result<u64, DbPoolError>>>,
    },
    Query {
        sql: String,
        respond_to: oneshot::Sender<Result<Option<QueryResultSet>, DbPoolError>>,
    },
    QueryStmt {
        params: ParameterSet,
        respond_to: oneshot::Sender<Result<Option<PreparedQueryResultSet>, DbPoolError>>,
    },
    PrepareStatements {
        respond_to: std_mpsc::Sender<Result<Vec<u8>, DbPoolError>>,
    },
    Ping,
    Shutdown,
}
