use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;

use tracing::debug;

use crate::connection::Connection;
use crate::driver::Driver;

use super::channel::Command;

/// Worker-thread main loop. Owns the connection outright, so every prepared
/// statement buffer is touched by exactly one thread, and commands run
/// strictly in submission order.
pub(crate) fn run_worker<D: Driver>(
    mut connection: Connection<D>,
    receiver: &Receiver<Command>,
    pending: &AtomicUsize,
) {
    debug!("database worker running");

    while let Ok(command) = receiver.recv() {
        if matches!(command, Command::Shutdown) {
            break;
        }
        dispatch(&mut connection, command);
        pending.fetch_sub(1, Ordering::SeqCst);
    }

    connection.close();
    debug!("database worker stopped");
}

fn dispatch<D: Driver>(connection: &mut Connection<D>, command: Command) {
    match command {
        Command::Execute { sql, respond_to } => {
            let result = connection.execute(&sql);
            match respond_to {
                Some(tx) => {
                    let _ = tx.send(result);
                }
                // Fire-and-forget: the error was already logged by the
                // connection.
                None => {}
            }
        }
        Command::ExecuteStmt { params, respond_to } => {
            let result = connection.execute_stmt(&params);
            match respond_to {
                Some(tx) => {
                    let _ = tx.send(result);
                }
                None => {}
            }
        }
        Command::Query { sql, respond_to } => {
            let _ = respond_to.send(connection.query(&sql));
        }
        Command::QueryStmt { params, respond_to } => {
            let _ = respond_to.send(connection.query_stmt(&params));
        }
        Command::PrepareStatements { respond_to } => {
            let result = connection
                .prepare_statements()
                .map(|()| connection.statement_param_counts());
            let _ = respond_to.send(result);
        }
        Command::Ping => connection.ping(),
        Command::Shutdown => unreachable!("shutdown is handled by the worker loop"),
    }
}
