use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

use rusqlite::{Connection, params_from_iter};

use crate::error::SqlConnError;
use crate::sqlite::query::build_result_set;

use super::channel::Command;

pub(super) fn run_sqlite_worker(conn: Connection, receiver: &Receiver<Command>, running: &AtomicBool) {
    let mut ack = None;

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown { respond_to } => {
                ack = respond_to;
                break;
            }
            Command::Probe { respond_to } => {
                let result = conn
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map(|_| ())
                    .map_err(SqlConnError::SqliteError);
                let _ = respond_to.send(result);
            }
            Command::EnsureAutoCommit { respond_to } => {
                // a fresh handle is in auto-commit unless something opened a transaction
                let result = if conn.is_autocommit() {
                    Ok(())
                } else {
                    conn.execute_batch("ROLLBACK")
                        .map_err(SqlConnError::SqliteError)
                };
                let _ = respond_to.send(result);
            }
            Command::Prepare { query, respond_to } => {
                let result = conn
                    .prepare_cached(&query)
                    .map(|_| ())
                    .map_err(SqlConnError::SqliteError);
                let _ = respond_to.send(result);
            }
            Command::Execute {
                query,
                params,
                respond_to,
            } => {
                let result = conn
                    .prepare_cached(&query)
                    .and_then(|mut stmt| stmt.execute(params_from_iter(params.iter())))
                    .map_err(SqlConnError::SqliteError);
                let _ = respond_to.send(result);
            }
            Command::Query {
                query,
                params,
                respond_to,
            } => {
                let result = conn
                    .prepare_cached(&query)
                    .map_err(SqlConnError::SqliteError)
                    .and_then(|mut stmt| build_result_set(&mut stmt, &params));
                let _ = respond_to.send(result);
            }
        }
    }

    conn.flush_prepared_statement_cache();
    running.store(false, Ordering::Release);
    if let Err((_, err)) = conn.close() {
        tracing::debug!(error = %err, "sqlite connection did not close cleanly");
    }
    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}
