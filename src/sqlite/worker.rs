use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;

use rusqlite::Connection;
use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::SqlConnError;
use crate::results::ResultSet;

use super::config::SqliteOptions;

mod channel;
mod dispatcher;

use channel::{Command, Reply};
use dispatcher::run_sqlite_worker;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// A thread that owns one `rusqlite::Connection` and serves [`Command`]s.
pub(crate) struct SqliteWorker {
    sender: Sender<Command>,
    running: Arc<AtomicBool>,
    id: u64,
}

impl SqliteWorker {
    /// Start the thread and open the database on it.
    pub(crate) async fn spawn(options: &SqliteOptions) -> Result<Self, SqlConnError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SqlConnError>>();
        let running = Arc::new(AtomicBool::new(true));
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);

        let db_path = options.db_path.clone();
        let busy_timeout = options.busy_timeout;
        let cache_capacity = options.statement_cache_capacity;
        let thread_running = Arc::clone(&running);
        thread::Builder::new()
            .name(format!("sqlite-worker-{id}"))
            .spawn(move || {
                let opened = Connection::open(&db_path).and_then(|conn| {
                    conn.set_prepared_statement_cache_capacity(cache_capacity);
                    if let Some(timeout) = busy_timeout {
                        conn.busy_timeout(timeout)?;
                    }
                    Ok(conn)
                });
                match opened {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        run_sqlite_worker(conn, &receiver, &thread_running);
                    }
                    Err(err) => {
                        thread_running.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(SqlConnError::SqliteError(err)));
                    }
                }
            })
            .map_err(|err| {
                SqlConnError::ConnectionError(format!("failed to spawn SQLite worker thread: {err}"))
            })?;

        ready_rx.await.map_err(|_| {
            SqlConnError::ConnectionError("SQLite worker exited before opening the database".into())
        })??;

        Ok(Self {
            sender,
            running,
            id,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) async fn probe(&self) -> Result<(), SqlConnError> {
        self.request("probe", |respond_to| Command::Probe { respond_to })
            .await
    }

    pub(crate) async fn ensure_auto_commit(&self) -> Result<(), SqlConnError> {
        self.request("auto-commit check", |respond_to| Command::EnsureAutoCommit {
            respond_to,
        })
        .await
    }

    pub(crate) async fn prepare(&self, query: Arc<String>) -> Result<(), SqlConnError> {
        self.request("prepare", |respond_to| Command::Prepare { query, respond_to })
            .await
    }

    pub(crate) async fn execute(
        &self,
        query: Arc<String>,
        params: Vec<Value>,
    ) -> Result<usize, SqlConnError> {
        self.request("execute", |respond_to| Command::Execute {
            query,
            params,
            respond_to,
        })
        .await
    }

    pub(crate) async fn query(
        &self,
        query: Arc<String>,
        params: Vec<Value>,
    ) -> Result<ResultSet, SqlConnError> {
        self.request("query", |respond_to| Command::Query {
            query,
            params,
            respond_to,
        })
        .await
    }

    /// Ask the worker to stop and wait until its connection is closed.
    /// A worker that is already gone counts as closed.
    pub(crate) async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(Command::Shutdown {
                respond_to: Some(tx),
            })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn request<T>(
        &self,
        what: &str,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SqlConnError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .map_err(|_| worker_gone(format!("SQLite worker closed before {what}")))?;
        rx.await
            .map_err(|_| worker_gone(format!("SQLite worker dropped during {what}")))?
    }
}

/// A worker that stopped answering is a lost session.
fn worker_gone(message: String) -> SqlConnError {
    SqlConnError::recoverable(SqlConnError::ConnectionError(message))
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown { respond_to: None });
    }
}

impl fmt::Debug for SqliteWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteWorker")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}
