use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Statement};

use super::config::PgOptions;
use super::params::Params;
use super::query::build_result_set_from_statement;
use crate::backend::{ConnectionBackend, PrepareVariant, with_returning_clause};
use crate::error::SqlConnError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// SQLSTATEs the server sends when it is shutting a session down.
const ADMIN_SHUTDOWN_CODES: [&str; 3] = ["57P01", "57P02", "57P03"];

/// Opens tokio-postgres sessions without TLS.
#[derive(Debug, Clone)]
pub struct PgBackend {
    options: PgOptions,
}

impl PgBackend {
    #[must_use]
    pub fn new(options: PgOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &PgOptions {
        &self.options
    }
}

/// A client plus the task driving its socket.
#[derive(Debug)]
pub struct PgConnection {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgConnection {
    /// The underlying client, for work the manager does not wrap.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ConnectionBackend for PgBackend {
    type Connection = PgConnection;
    type Statement = Statement;

    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn connect(&self) -> Result<PgConnection, SqlConnError> {
        let (client, connection) = self.options.config().connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "postgres connection driver exited");
            }
        });
        Ok(PgConnection { client, driver })
    }

    fn is_closed(&self, conn: &PgConnection) -> bool {
        conn.client.is_closed() || conn.driver.is_finished()
    }

    async fn is_valid(&self, conn: &PgConnection) -> Result<(), SqlConnError> {
        conn.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn prepare(
        &self,
        conn: &PgConnection,
        sql: &str,
        variant: PrepareVariant,
    ) -> Result<Statement, SqlConnError> {
        let text = match variant {
            PrepareVariant::Plain => std::borrow::Cow::Borrowed(sql),
            PrepareVariant::ReturnGeneratedKeys => with_returning_clause(sql),
        };
        conn.client.prepare(&text).await.map_err(classify)
    }

    async fn close(&self, conn: &PgConnection) -> Result<(), SqlConnError> {
        // the driver owns the socket; stopping it ends the session
        conn.driver.abort();
        Ok(())
    }

    async fn execute(
        &self,
        conn: &PgConnection,
        stmt: &Statement,
        params: &[RowValues],
    ) -> Result<usize, SqlConnError> {
        let converted = Params::convert(params);
        let rows = conn
            .client
            .execute(stmt, converted.as_refs())
            .await
            .map_err(classify)?;
        usize::try_from(rows).map_err(|e| {
            SqlConnError::ExecutionError(format!("postgres affected rows conversion error: {e}"))
        })
    }

    async fn query(
        &self,
        conn: &PgConnection,
        stmt: &Statement,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlConnError> {
        let converted = Params::convert(params);
        let rows = conn
            .client
            .query(stmt, converted.as_refs())
            .await
            .map_err(classify)?;
        build_result_set_from_statement(stmt, &rows)
    }
}

/// Sort a driver error into lost-session or ordinary failure.
pub(crate) fn classify(err: tokio_postgres::Error) -> SqlConnError {
    if is_connection_loss(&err) {
        SqlConnError::recoverable(err)
    } else {
        SqlConnError::PostgresError(err)
    }
}

fn is_connection_loss(err: &tokio_postgres::Error) -> bool {
    if err.is_closed() {
        return true;
    }
    if let Some(state) = err.code() {
        return is_connection_loss_code(state.code());
    }
    std::error::Error::source(err).is_some_and(|source| source.is::<std::io::Error>())
}

/// Class 08 (connection exception) or an administrator ending the session.
fn is_connection_loss_code(code: &str) -> bool {
    code.starts_with("08") || ADMIN_SHUTDOWN_CODES.contains(&code)
}
