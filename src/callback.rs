use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{error, warn};

use crate::error::DbPoolError;
use crate::results::{PreparedQueryResultSet, QueryResultSet};

/// One deferred completion travelling from a worker thread back to the
/// caller.
///
/// This is the single completion core behind all three execution modes:
/// [`wait`](Self::wait) blocks, [`recv`](Self::recv) awaits, and
/// [`QueryCallback`] polls it once per application tick.
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

pub(crate) enum PollOutcome<T> {
    NotReady,
    Ready(T),
    /// The worker went away without answering.
    Gone,
}

impl<T> Pending<T> {
    pub(crate) fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx }
    }

    /// A completion whose worker is already gone; resolves as abandoned.
    pub(crate) fn closed() -> Self {
        let (_tx, rx) = oneshot::channel();
        Self { rx }
    }

    /// Block the calling thread until the worker answers. For applications
    /// without an async runtime; inside one, use [`recv`](Self::recv).
    ///
    /// # Errors
    /// Fails when the worker stopped before answering.
    ///
    /// # Panics
    /// Panics when called from within an async runtime context.
    pub fn wait(self) -> Result<T, DbPoolError> {
        self.rx.blocking_recv().map_err(|_| {
            DbPoolError::ConnectionError("worker stopped before completing the task".into())
        })
    }

    /// Await the completion; the calling task suspends until the worker
    /// finishes the native call.
    ///
    /// # Errors
    /// Fails when the worker stopped before answering.
    pub async fn recv(self) -> Result<T, DbPoolError> {
        self.rx.await.map_err(|_| {
            DbPoolError::ConnectionError("worker stopped before completing the task".into())
        })
    }

    /// Non-blocking poll, safe to call every tick.
    pub(crate) fn poll_once(&mut self) -> PollOutcome<T> {
        match self.rx.try_recv() {
            Ok(value) => PollOutcome::Ready(value),
            Err(TryRecvError::Empty) => PollOutcome::NotReady,
            Err(TryRecvError::Closed) => PollOutcome::Gone,
        }
    }
}

type QueryContinuation = Box<dyn FnOnce(Option<&mut QueryResultSet>) + Send>;
type PreparedContinuation = Box<dyn FnOnce(Option<&mut PreparedQueryResultSet>) + Send>;

enum Continuation {
    Query(QueryContinuation),
    Prepared(PreparedContinuation),
}

enum TokenState {
    WaitingQuery(Pending<Result<Option<QueryResultSet>, DbPoolError>>),
    WaitingPrepared(Pending<Result<Option<PreparedQueryResultSet>, DbPoolError>>),
    ReadyQuery(Option<QueryResultSet>),
    ReadyPrepared(Option<PreparedQueryResultSet>),
    Done,
}

/// A deferred query result plus its queued continuations.
///
/// Returned by the pool's `async_query` methods; hand it to a
/// [`CallbackProcessor`] so the continuations run on the application's own
/// tick, never on a worker thread. Continuations run in registration order,
/// one per tick; they receive `None` when the query failed or returned no
/// rows. The result stays owned by the token, so a later continuation sees
/// where an earlier one left the row position.
///
/// ```rust,no_run
/// # use sql_workpool::prelude::*;
/// # fn demo(pool: &WorkerPool, processor: &mut CallbackProcessor) {
/// let callback = pool
///     .async_query("select name from account")
///     .then(|result| {
///         if let Some(rows) = result {
///             while rows.next_row() {
///                 println!("{}", rows.field(0).get_str().unwrap_or(""));
///             }
///         }
///     });
/// processor.add_callback(callback);
/// # }
/// ```
pub struct QueryCallback {
    state: TokenState,
    continuations: VecDeque<Continuation>,
}

impl QueryCallback {
    pub(crate) fn from_query(
        pending: Pending<Result<Option<QueryResultSet>, DbPoolError>>,
    ) -> Self {
        Self {
            state: TokenState::WaitingQuery(pending),
            continuations: VecDeque::new(),
        }
    }

    pub(crate) fn from_prepared(
        pending: Pending<Result<Option<PreparedQueryResultSet>, DbPoolError>>,
    ) -> Self {
        Self {
            state: TokenState::WaitingPrepared(pending),
            continuations: VecDeque::new(),
        }
    }

    /// Append a continuation for a raw-SQL query result.
    #[must_use]
    pub fn then(mut self, f: impl FnOnce(Option<&mut QueryResultSet>) + Send + 'static) -> Self {
        self.continuations.push_back(Continuation::Query(Box::new(f)));
        self
    }

    /// Append a continuation for a prepared-statement query result.
    #[must_use]
    pub fn then_prepared(
        mut self,
        f: impl FnOnce(Option<&mut PreparedQueryResultSet>) + Send + 'static,
    ) -> Self {
        self.continuations
            .push_back(Continuation::Prepared(Box::new(f)));
        self
    }

    /// Non-blocking poll: when the result is in, run the front continuation
    /// and pop it. Returns true once the token is fully drained and can be
    /// dropped.
    ///
    /// Never blocks. Must not be called from the connection's worker thread
    /// (the processor never does).
    pub fn invoke_if_ready(&mut self) -> bool {
        match &mut self.state {
            TokenState::WaitingQuery(pending) => match pending.poll_once() {
                PollOutcome::NotReady => return false,
                PollOutcome::Ready(Ok(result)) => self.state = TokenState::ReadyQuery(result),
                PollOutcome::Ready(Err(err)) => {
                    warn!("async query failed: {err}");
                    self.state = TokenState::ReadyQuery(None);
                }
                PollOutcome::Gone => {
                    warn!("async query abandoned: worker stopped");
                    self.state = TokenState::ReadyQuery(None);
                }
            },
            TokenState::WaitingPrepared(pending) => match pending.poll_once() {
                PollOutcome::NotReady => return false,
                PollOutcome::Ready(Ok(result)) => self.state = TokenState::ReadyPrepared(result),
                PollOutcome::Ready(Err(err)) => {
                    warn!("async prepared query failed: {err}");
                    self.state = TokenState::ReadyPrepared(None);
                }
                PollOutcome::Gone => {
                    warn!("async prepared query abandoned: worker stopped");
                    self.state = TokenState::ReadyPrepared(None);
                }
            },
            _ => {}
        }

        let Some(continuation) = self.continuations.pop_front() else {
            self.state = TokenState::Done;
            return true;
        };

        match (continuation, &mut self.state) {
            (Continuation::Query(f), TokenState::ReadyQuery(result)) => f(result.as_mut()),
            (Continuation::Prepared(f), TokenState::ReadyPrepared(result)) => f(result.as_mut()),
            (Continuation::Query(f), _) => {
                error!("raw-query continuation registered on a prepared-query token");
                f(None);
            }
            (Continuation::Prepared(f), _) => {
                error!("prepared-query continuation registered on a raw-query token");
                f(None);
            }
        }

        if self.continuations.is_empty() {
            self.state = TokenState::Done;
            true
        } else {
            false
        }
    }

    /// Blocking-wait adapter: discard any continuations and block for the
    /// raw-query result.
    ///
    /// # Errors
    /// Fails when the worker stopped, the query failed, or the token holds a
    /// prepared-query result.
    pub fn wait_query(self) -> Result<Option<QueryResultSet>, DbPoolError> {
        match self.state {
            TokenState::WaitingQuery(pending) => pending.wait()?,
            TokenState::ReadyQuery(result) => Ok(result),
            _ => Err(DbPoolError::ExecutionError(
                "token does not carry a raw-query result".into(),
            )),
        }
    }

    /// Blocking-wait adapter: discard any continuations and block for the
    /// prepared-query result.
    ///
    /// # Errors
    /// Fails when the worker stopped, the query failed, or the token holds a
    /// raw-query result.
    pub fn wait_prepared(self) -> Result<Option<PreparedQueryResultSet>, DbPoolError> {
        match self.state {
            TokenState::WaitingPrepared(pending) => pending.wait()?,
            TokenState::ReadyPrepared(result) => Ok(result),
            _ => Err(DbPoolError::ExecutionError(
                "token does not carry a prepared-query result".into(),
            )),
        }
    }
}

/// Queue of [`QueryCallback`]s drained once per application tick.
///
/// This is the only place continuations execute, which is what keeps them
/// from ever racing with a connection worker thread: the application owns
/// the processor and calls [`process_ready_callbacks`](Self::process_ready_callbacks)
/// from its own loop.
#[derive(Default)]
pub struct CallbackProcessor {
    callbacks: Vec<QueryCallback>,
}

impl CallbackProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: QueryCallback) {
        self.callbacks.push(callback);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Poll every held token once; drop the ones that report completion.
    pub fn process_ready_callbacks(&mut self) {
        if self.callbacks.is_empty() {
            return;
        }

        let callbacks = std::mem::take(&mut self.callbacks);
        for mut callback in callbacks {
            if !callback.invoke_if_ready() {
                self.callbacks.push(callback);
            }
        }
    }
}
