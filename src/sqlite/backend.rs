use std::sync::Arc;

use async_trait::async_trait;

use super::config::SqliteOptions;
use super::params::Params;
use super::worker::SqliteWorker;
use crate::backend::{ConnectionBackend, PrepareVariant, with_returning_clause};
use crate::error::SqlConnError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Opens worker-backed `SQLite` connections to one database file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    options: SqliteOptions,
}

impl SqliteBackend {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

/// Owned `SQLite` connection backed by a dedicated worker thread.
#[derive(Debug)]
pub struct SqliteConnection {
    worker: SqliteWorker,
}

impl SqliteConnection {
    /// Identifier of the worker thread serving this connection.
    #[must_use]
    pub fn worker_id(&self) -> u64 {
        self.worker.id()
    }
}

/// A query compiled into one worker's statement cache.
///
/// The worker's cache is bounded by
/// [`SqliteOptions::statement_cache_capacity`]; an evicted query is recompiled
/// transparently the next time this handle runs.
#[derive(Debug, Clone)]
pub struct SqliteStatement {
    query: Arc<String>,
    worker_id: u64,
}

impl SqliteStatement {
    /// The text actually compiled, after any `RETURNING` rewrite.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl SqliteBackend {
    fn check_owner(conn: &SqliteConnection, stmt: &SqliteStatement) -> Result<(), SqlConnError> {
        if conn.worker.id() == stmt.worker_id {
            Ok(())
        } else {
            Err(SqlConnError::ExecutionError(format!(
                "statement was prepared on SQLite worker {} but run on worker {}",
                stmt.worker_id,
                conn.worker.id()
            )))
        }
    }
}

#[async_trait]
impl ConnectionBackend for SqliteBackend {
    type Connection = SqliteConnection;
    type Statement = SqliteStatement;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&self) -> Result<SqliteConnection, SqlConnError> {
        let worker = SqliteWorker::spawn(&self.options).await?;
        Ok(SqliteConnection { worker })
    }

    async fn enable_auto_commit(&self, conn: &SqliteConnection) -> Result<(), SqlConnError> {
        conn.worker.ensure_auto_commit().await
    }

    fn is_closed(&self, conn: &SqliteConnection) -> bool {
        !conn.worker.is_running()
    }

    async fn is_valid(&self, conn: &SqliteConnection) -> Result<(), SqlConnError> {
        conn.worker.probe().await
    }

    async fn prepare(
        &self,
        conn: &SqliteConnection,
        sql: &str,
        variant: PrepareVariant,
    ) -> Result<SqliteStatement, SqlConnError> {
        let text = match variant {
            PrepareVariant::Plain => sql.to_owned(),
            PrepareVariant::ReturnGeneratedKeys => with_returning_clause(sql).into_owned(),
        };
        let query = Arc::new(text);
        conn.worker.prepare(Arc::clone(&query)).await?;
        Ok(SqliteStatement {
            query,
            worker_id: conn.worker.id(),
        })
    }

    async fn close(&self, conn: &SqliteConnection) -> Result<(), SqlConnError> {
        conn.worker.shutdown().await;
        Ok(())
    }

    async fn execute(
        &self,
        conn: &SqliteConnection,
        stmt: &SqliteStatement,
        params: &[RowValues],
    ) -> Result<usize, SqlConnError> {
        Self::check_owner(conn, stmt)?;
        let values = Params::convert(params).into_values();
        conn.worker.execute(Arc::clone(&stmt.query), values).await
    }

    async fn query(
        &self,
        conn: &SqliteConnection,
        stmt: &SqliteStatement,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlConnError> {
        Self::check_owner(conn, stmt)?;
        let values = Params::convert(params).into_values();
        conn.worker.query(Arc::clone(&stmt.query), values).await
    }
}
