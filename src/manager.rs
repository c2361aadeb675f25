//! One shared, self-healing connection with a compiled-statement cache.
//!
//! [`ConnectionManager`] hands out a connection that has just passed a bounded
//! liveness probe, reopening it when it has gone away, and compiles each distinct
//! query once per connection. The execute helpers wrap prepare, bind and execute
//! in a single reconnect-and-retry for errors classed as
//! [`Recoverable`](crate::ErrorClass::Recoverable).
//!
//! ```rust,no_run
//! # use sql_conn_manager::prelude::*;
//! # async fn demo() -> Result<(), SqlConnError> {
//! let backend = SqliteBackend::new(SqliteOptions::new("shop.db".into()));
//! let manager = std::sync::Arc::new(ConnectionManager::new(backend));
//!
//! let updated = manager
//!     .execute_update("UPDATE client SET name = ?1 WHERE id = ?2", &|p: &mut BoundParams| -> Result<(), SqlConnError> {
//!         p.push("Ada").push(7_i64);
//!         Ok(())
//!     })
//!     .await?;
//! # let _ = updated;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod handle;
mod stats;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

pub use handle::{ConnectionHandle, PreparedStatement};
pub use stats::ManagerStats;

use cache::StatementCache;
use stats::{StatsCounters, bump};

use crate::backend::{ConnectionBackend, PrepareVariant, StatementKey};
use crate::binder::{BoundParams, StatementBinder};
use crate::config::ManagerOptions;
use crate::error::{ErrorClass, SqlConnError};
use crate::results::ResultSet;

/// Run an attempt; on a recoverable failure reconnect (unless another caller
/// already replaced the failed connection) and run it once more.
///
/// `$used` names the slot the attempt records its connection id in.
macro_rules! retry_once {
    ($manager:expr, $sql:expr, $used:ident => $attempt:expr) => {{
        let mut first_used: Option<u64> = None;
        let first = {
            let $used = &mut first_used;
            $attempt.await
        };
        match first {
            Ok(value) => Ok(value),
            Err(err) => match err.class() {
                ErrorClass::Fatal => Err(err),
                ErrorClass::Recoverable => {
                    warn!(sql = %$sql, error = %err, "connection lost mid-statement, reconnecting for one retry");
                    bump(&$manager.stats.retries);
                    $manager.replace_failed(first_used).await?;
                    let mut retry_used: Option<u64> = None;
                    let $used = &mut retry_used;
                    $attempt.await
                }
            },
        }
    }};
}

/// Owner of the single live connection and its statement cache.
///
/// Share it as `Arc<ConnectionManager<_>>`; every method takes `&self`.
pub struct ConnectionManager<B: ConnectionBackend> {
    backend: B,
    options: ManagerOptions,
    current: ArcSwapOption<ConnectionHandle<B>>,
    reconnect_lock: TokioMutex<()>,
    statements: StatementCache<B>,
    last_id: AtomicU64,
    stats: StatsCounters,
}

impl<B: ConnectionBackend> fmt::Debug for ConnectionManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.backend.name())
            .field("options", &self.options)
            .field("connection_id", &self.current_connection_id())
            .field("cached_statements", &self.statements.len())
            .finish()
    }
}

impl<B: ConnectionBackend> ConnectionManager<B> {
    /// Build a manager with default options. No connection is opened yet.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, ManagerOptions::default())
    }

    #[must_use]
    pub fn with_options(backend: B, options: ManagerOptions) -> Self {
        Self {
            backend,
            options,
            current: ArcSwapOption::empty(),
            reconnect_lock: TokioMutex::new(()),
            statements: StatementCache::new(),
            last_id: AtomicU64::new(0),
            stats: StatsCounters::default(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.statements.len()
    }

    /// Id of the current connection, without probing or opening one.
    #[must_use]
    pub fn current_connection_id(&self) -> Option<u64> {
        self.current.load_full().map(|conn| conn.id())
    }

    /// Return a connection that is open and has just passed the liveness probe,
    /// opening a new one if needed.
    ///
    /// # Errors
    /// `SqlConnError::ConnectFailed` if a new connection had to be opened and that failed.
    pub async fn get_connection(&self) -> Result<Arc<ConnectionHandle<B>>, SqlConnError> {
        let seen = self.current.load_full();
        if let Some(conn) = &seen {
            if self.is_usable(conn).await {
                return Ok(Arc::clone(conn));
            }
        }

        let _guard = self.reconnect_lock.lock().await;
        // Someone else may have reconnected while we waited. A handle we already
        // saw fail is not probed again.
        if let Some(conn) = self.current.load_full() {
            let already_failed = seen.as_ref().is_some_and(|s| s.id() == conn.id());
            if !already_failed && self.is_usable(&conn).await {
                return Ok(conn);
            }
        }
        self.reconnect_locked().await
    }

    /// Cached statement for `sql`, compiled against the current connection.
    ///
    /// The statement carries no parameter state; execute it with a fresh
    /// [`BoundParams`].
    ///
    /// # Errors
    /// Connection errors from [`get_connection`](Self::get_connection) or compile
    /// errors from the backend.
    pub async fn prepare(&self, sql: &str) -> Result<Arc<PreparedStatement<B>>, SqlConnError> {
        self.prepare_with(sql, PrepareVariant::Plain).await
    }

    /// Like [`prepare`](Self::prepare) with explicit compilation options. Each variant
    /// of the same text has its own cache entry.
    ///
    /// # Errors
    /// Connection errors from [`get_connection`](Self::get_connection) or compile
    /// errors from the backend.
    pub async fn prepare_with(
        &self,
        sql: &str,
        variant: PrepareVariant,
    ) -> Result<Arc<PreparedStatement<B>>, SqlConnError> {
        let conn = self.get_connection().await?;
        self.prepare_on(conn, sql, variant).await
    }

    /// Run an INSERT/UPDATE/DELETE and return the affected-row count.
    ///
    /// `binder` fills a fresh parameter buffer. If the connection is lost during
    /// the attempt the manager reconnects and runs prepare, bind and execute once
    /// more, so `binder` may be called twice.
    ///
    /// # Errors
    /// Any non-recoverable error at once; a recoverable error only if the retry
    /// fails too; `ConnectFailed` if the reconnect itself fails.
    pub async fn execute_update(
        &self,
        sql: &str,
        binder: &(impl StatementBinder + ?Sized),
    ) -> Result<usize, SqlConnError> {
        retry_once!(self, sql, used => self.attempt_update(sql, binder, used))
    }

    /// Run a query and return its rows. The result set belongs to the caller.
    ///
    /// Retry behaviour is the same as [`execute_update`](Self::execute_update).
    ///
    /// # Errors
    /// See [`execute_update`](Self::execute_update).
    pub async fn execute_query(
        &self,
        sql: &str,
        binder: &(impl StatementBinder + ?Sized),
    ) -> Result<ResultSet, SqlConnError> {
        retry_once!(self, sql, used => self.attempt_query(sql, PrepareVariant::Plain, binder, used))
    }

    /// Run DML compiled with [`PrepareVariant::ReturnGeneratedKeys`] and return the
    /// generated keys, one row per affected row.
    ///
    /// Retry behaviour is the same as [`execute_update`](Self::execute_update).
    ///
    /// # Errors
    /// See [`execute_update`](Self::execute_update).
    pub async fn execute_returning_keys(
        &self,
        sql: &str,
        binder: &(impl StatementBinder + ?Sized),
    ) -> Result<ResultSet, SqlConnError> {
        retry_once!(
            self,
            sql,
            used => self.attempt_query(sql, PrepareVariant::ReturnGeneratedKeys, binder, used)
        )
    }

    /// Execute an already prepared statement once. No retry.
    ///
    /// # Errors
    /// `Recoverable` if the statement was closed by a reconnect, otherwise whatever
    /// the backend reports.
    pub async fn execute_prepared(
        &self,
        stmt: &PreparedStatement<B>,
        params: &BoundParams,
    ) -> Result<usize, SqlConnError> {
        ensure_open(stmt)?;
        self.backend
            .execute(stmt.connection().raw(), stmt.raw(), params.as_slice())
            .await
    }

    /// Query with an already prepared statement once. No retry.
    ///
    /// # Errors
    /// `Recoverable` if the statement was closed by a reconnect, otherwise whatever
    /// the backend reports.
    pub async fn query_prepared(
        &self,
        stmt: &PreparedStatement<B>,
        params: &BoundParams,
    ) -> Result<ResultSet, SqlConnError> {
        ensure_open(stmt)?;
        self.backend
            .query(stmt.connection().raw(), stmt.raw(), params.as_slice())
            .await
    }

    /// Replace the connection now, without probing the current one.
    ///
    /// # Errors
    /// `SqlConnError::ConnectFailed` if the new connection cannot be opened. The
    /// manager is then left without a connection and the next call tries again.
    pub async fn force_reconnect(&self) -> Result<Arc<ConnectionHandle<B>>, SqlConnError> {
        let _guard = self.reconnect_lock.lock().await;
        bump(&self.stats.forced_reconnects);
        self.reconnect_locked().await
    }

    /// Close every cached statement and the connection. Idempotent; the manager
    /// opens a fresh connection if it is used again afterwards.
    pub async fn shutdown(&self) {
        let _guard = self.reconnect_lock.lock().await;
        let old = self.current.swap(None);
        self.close_cached_statements().await;
        if let Some(old) = old {
            self.close_quietly(&old).await;
            info!(
                backend = self.backend.name(),
                connection_id = old.id(),
                "connection shut down"
            );
        }
    }

    async fn attempt_update(
        &self,
        sql: &str,
        binder: &(impl StatementBinder + ?Sized),
        used: &mut Option<u64>,
    ) -> Result<usize, SqlConnError> {
        let conn = self.get_connection().await?;
        *used = Some(conn.id());
        let stmt = self.prepare_on(conn, sql, PrepareVariant::Plain).await?;
        let params = bind(binder)?;
        self.execute_prepared(&stmt, &params).await
    }

    async fn attempt_query(
        &self,
        sql: &str,
        variant: PrepareVariant,
        binder: &(impl StatementBinder + ?Sized),
        used: &mut Option<u64>,
    ) -> Result<ResultSet, SqlConnError> {
        let conn = self.get_connection().await?;
        *used = Some(conn.id());
        let stmt = self.prepare_on(conn, sql, variant).await?;
        let params = bind(binder)?;
        self.query_prepared(&stmt, &params).await
    }

    /// Cache lookup and compile against an already validated connection.
    async fn prepare_on(
        &self,
        conn: Arc<ConnectionHandle<B>>,
        sql: &str,
        variant: PrepareVariant,
    ) -> Result<Arc<PreparedStatement<B>>, SqlConnError> {
        let key = StatementKey::new(sql, variant);

        if let Some(cached) = self.statements.get(&key) {
            if !cached.is_closed() && cached.connection_id() == conn.id() {
                bump(&self.stats.cache_hits);
                return Ok(cached);
            }
        }

        bump(&self.stats.cache_misses);
        let raw = self.backend.prepare(conn.raw(), sql, variant).await?;
        debug!(connection_id = conn.id(), %variant, sql, "compiled statement");
        let stmt = Arc::new(PreparedStatement::new(key.clone(), raw, conn));
        if let Some(displaced) = self.statements.insert(key, Arc::clone(&stmt)) {
            // a same-connection duplicate may still be in use by its caller
            if displaced.connection_id() != stmt.connection_id() {
                self.close_statement_quietly(&displaced).await;
            }
        }
        Ok(stmt)
    }

    /// Retry-path reconnect. Reconnects only while the connection the failed
    /// attempt ran on is still current; a caller that lost the race reuses the
    /// replacement instead of tearing it down again.
    async fn replace_failed(
        &self,
        failed: Option<u64>,
    ) -> Result<Arc<ConnectionHandle<B>>, SqlConnError> {
        let _guard = self.reconnect_lock.lock().await;
        if let (Some(failed), Some(current)) = (failed, self.current.load_full()) {
            if current.id() != failed {
                debug!(
                    failed_connection_id = failed,
                    connection_id = current.id(),
                    "connection already replaced, retrying on it"
                );
                return Ok(current);
            }
        }
        bump(&self.stats.forced_reconnects);
        self.reconnect_locked().await
    }

    async fn is_usable(&self, conn: &ConnectionHandle<B>) -> bool {
        if self.backend.is_closed(conn.raw()) {
            return false;
        }
        let probe = tokio::time::timeout(
            self.options.validation_timeout,
            self.backend.is_valid(conn.raw()),
        )
        .await;
        match probe {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                bump(&self.stats.probe_failures);
                debug!(connection_id = conn.id(), error = %err, "liveness probe failed");
                false
            }
            Err(_) => {
                bump(&self.stats.probe_failures);
                debug!(
                    connection_id = conn.id(),
                    timeout = ?self.options.validation_timeout,
                    "liveness probe timed out"
                );
                false
            }
        }
    }

    /// Caller holds `reconnect_lock`.
    async fn reconnect_locked(&self) -> Result<Arc<ConnectionHandle<B>>, SqlConnError> {
        let old = self.current.swap(None);
        self.close_cached_statements().await;
        if let Some(old) = &old {
            self.close_quietly(old).await;
        }

        let conn = self
            .backend
            .connect()
            .await
            .map_err(SqlConnError::connect_failed)?;
        if let Err(err) = self.backend.enable_auto_commit(&conn).await {
            if let Err(close_err) = self.backend.close(&conn).await {
                self.note_cleanup_failure("connection", &close_err);
            }
            return Err(SqlConnError::connect_failed(err));
        }

        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = Arc::new(ConnectionHandle::new(id, conn));
        self.current.store(Some(Arc::clone(&handle)));
        bump(&self.stats.connections_opened);
        info!(
            backend = self.backend.name(),
            connection_id = id,
            replaced = old.as_ref().map(|c| c.id()),
            "connection opened"
        );
        Ok(handle)
    }

    async fn close_cached_statements(&self) {
        for stmt in self.statements.drain() {
            self.close_statement_quietly(&stmt).await;
        }
    }

    async fn close_statement_quietly(&self, stmt: &PreparedStatement<B>) {
        if !stmt.mark_closed() {
            return;
        }
        if let Err(err) = self
            .backend
            .close_statement(stmt.connection().raw(), stmt.raw())
            .await
        {
            self.note_cleanup_failure("statement", &err);
        }
    }

    async fn close_quietly(&self, conn: &ConnectionHandle<B>) {
        if self.backend.is_closed(conn.raw()) {
            return;
        }
        if let Err(err) = self.backend.close(conn.raw()).await {
            self.note_cleanup_failure("connection", &err);
        }
    }

    fn note_cleanup_failure(&self, what: &str, err: &SqlConnError) {
        bump(&self.stats.cleanup_failures);
        debug!(resource = what, error = %err, "ignoring error while closing stale resource");
    }
}

fn bind(binder: &(impl StatementBinder + ?Sized)) -> Result<BoundParams, SqlConnError> {
    // fresh buffer per attempt: parameter state never outlives one execution
    let mut params = BoundParams::new();
    binder.bind(&mut params)?;
    Ok(params)
}

fn ensure_open<B: ConnectionBackend>(stmt: &PreparedStatement<B>) -> Result<(), SqlConnError> {
    if stmt.is_closed() {
        return Err(SqlConnError::recoverable(SqlConnError::ConnectionError(
            format!("statement was closed by a reconnect: {}", stmt.key()),
        )));
    }
    Ok(())
}
