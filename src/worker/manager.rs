use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tokio::sync::oneshot;
use tracing::warn;

use crate::callback::Pending;
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::DbPoolError;
use crate::params::ParameterSet;
use crate::results::{PreparedQueryResultSet, QueryResultSet};

use super::channel::Command;
use super::dispatcher::run_worker;

/// Pool-side handle to one async connection's worker thread.
///
/// The connection itself lives on the worker thread; this handle only holds
/// the command queue and a live counter of tasks submitted but not yet
/// completed, which the pool scans to pick the least-loaded connection.
pub(crate) struct WorkerHandle {
    sender: Sender<Command>,
    pending: Arc<AtomicUsize>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn<D: Driver>(
        index: usize,
        connection: Connection<D>,
    ) -> Result<Self, DbPoolError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let pending = Arc::new(AtomicUsize::new(0));
        let pending_in_worker = Arc::clone(&pending);
        let join = thread::Builder::new()
            .name(format!("db-worker-{index}"))
            .spawn(move || run_worker(connection, &receiver, &pending_in_worker))
            .map_err(|err| {
                DbPoolError::ConnectionError(format!(
                    "failed to spawn database worker thread: {err}"
                ))
            })?;

        Ok(Self {
            sender,
            pending,
            join: Some(join),
        })
    }

    /// Tasks submitted to this worker and not yet completed.
    pub(crate) fn pending_tasks(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn submit(&self, command: Command) -> Result<(), DbPoolError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.sender.send(command).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            DbPoolError::ConnectionError("database worker stopped".into())
        })
    }

    pub(crate) fn fire_execute(&self, sql: String) {
        if let Err(err) = self.submit(Command::Execute {
            sql,
            respond_to: None,
        }) {
            warn!("dropped async execute: {err}");
        }
    }

    pub(crate) fn fire_execute_stmt(&self, params: ParameterSet) {
        if let Err(err) = self.submit(Command::ExecuteStmt {
            params,
            respond_to: None,
        }) {
            warn!("dropped async execute: {err}");
        }
    }

    pub(crate) fn submit_execute(&self, sql: String) -> Pending<Result<u64, DbPoolError>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.submit(Command::Execute {
            sql,
            respond_to: Some(tx),
        });
        Pending::new(rx)
    }

    pub(crate) fn submit_execute_stmt(
        &self,
        params: ParameterSet,
    ) -> Pending<Result<u64, DbPoolError>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.submit(Command::ExecuteStmt {
            params,
            respond_to: Some(tx),
        });
        Pending::new(rx)
    }

    pub(crate) fn submit_query(
        &self,
        sql: String,
    ) -> Pending<Result<Option<QueryResultSet>, DbPoolError>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.submit(Command::Query {
            sql,
            respond_to: tx,
        });
        Pending::new(rx)
    }

    pub(crate) fn submit_query_stmt(
        &self,
        params: ParameterSet,
    ) -> Pending<Result<Option<PreparedQueryResultSet>, DbPoolError>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.submit(Command::QueryStmt {
            params,
            respond_to: tx,
        });
        Pending::new(rx)
    }

    /// Prepare the catalog on the worker-owned connection, blocking the
    /// caller until the worker answers with the per-id parameter counts.
    pub(crate) fn prepare_statements(&self) -> Result<Vec<u8>, DbPoolError> {
        let (tx, rx) = mpsc::channel();
        self.submit(Command::PrepareStatements { respond_to: tx })?;
        rx.recv().map_err(|_| {
            DbPoolError::ConnectionError("worker stopped while preparing statements".into())
        })?
    }

    pub(crate) fn fire_ping(&self) {
        let _ = self.submit(Command::Ping);
    }

    /// Ask the worker to stop and wait for it.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}
