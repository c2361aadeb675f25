//! The contract between [`ConnectionManager`](crate::ConnectionManager) and a database driver.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;

use crate::error::SqlConnError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Compilation options for a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrepareVariant {
    /// Compile the query text as given.
    #[default]
    Plain,
    /// Compile so that executing the statement yields the generated keys of the
    /// affected rows.
    ReturnGeneratedKeys,
}

impl fmt::Display for PrepareVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareVariant::Plain => f.write_str("plain"),
            PrepareVariant::ReturnGeneratedKeys => f.write_str("return_generated_keys"),
        }
    }
}

/// Statement cache key. The same text prepared with different variants gets
/// different entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    variant: PrepareVariant,
    sql: String,
}

impl StatementKey {
    #[must_use]
    pub fn new(sql: impl Into<String>, variant: PrepareVariant) -> Self {
        Self {
            variant,
            sql: sql.into(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn variant(&self) -> PrepareVariant {
        self.variant
    }
}

impl fmt::Display for StatementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            PrepareVariant::Plain => f.write_str(&self.sql),
            variant => write!(f, "{variant}::{}", self.sql),
        }
    }
}

/// A database driver the manager can open, probe, compile against and execute on.
///
/// Implementations own error classification: any failure that means the session is
/// gone (socket reset, server restart, worker thread exit) must be returned as
/// [`SqlConnError::Recoverable`]; everything else as an ordinary error.
#[async_trait]
pub trait ConnectionBackend: Send + Sync + 'static {
    /// A live session.
    type Connection: Send + Sync + 'static;
    /// A statement compiled against one particular session.
    type Statement: Clone + Send + Sync + 'static;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open a new session to the configured target.
    async fn connect(&self) -> Result<Self::Connection, SqlConnError>;

    /// Put a freshly opened session in auto-commit mode.
    async fn enable_auto_commit(&self, _conn: &Self::Connection) -> Result<(), SqlConnError> {
        Ok(())
    }

    /// Whether the session is known to be closed, without a round trip.
    fn is_closed(&self, conn: &Self::Connection) -> bool;

    /// Liveness probe. The manager bounds it with its validation timeout.
    async fn is_valid(&self, conn: &Self::Connection) -> Result<(), SqlConnError>;

    /// Compile `sql` against `conn`.
    async fn prepare(
        &self,
        conn: &Self::Connection,
        sql: &str,
        variant: PrepareVariant,
    ) -> Result<Self::Statement, SqlConnError>;

    /// Release a compiled statement.
    async fn close_statement(
        &self,
        _conn: &Self::Connection,
        _stmt: &Self::Statement,
    ) -> Result<(), SqlConnError> {
        Ok(())
    }

    /// Close the session. Closing an already closed session is not an error.
    async fn close(&self, conn: &Self::Connection) -> Result<(), SqlConnError>;

    /// Run a statement that returns no rows; yields the affected-row count.
    async fn execute(
        &self,
        conn: &Self::Connection,
        stmt: &Self::Statement,
        params: &[RowValues],
    ) -> Result<usize, SqlConnError>;

    /// Run a statement that returns rows.
    async fn query(
        &self,
        conn: &Self::Connection,
        stmt: &Self::Statement,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlConnError>;
}

/// Rewrite DML so it reports generated keys through a `RETURNING` clause, the
/// way both postgres and SQLite (3.35+) expose them.
///
/// Statements that are not INSERT/UPDATE/DELETE, or that already return
/// something, are left alone.
#[must_use]
pub fn with_returning_clause(sql: &str) -> Cow<'_, str> {
    let trimmed = sql.trim_end();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    let head = leading_keyword(trimmed);
    let is_dml = ["insert", "update", "delete"]
        .iter()
        .any(|kw| head.eq_ignore_ascii_case(kw));
    if !is_dml || contains_keyword(trimmed, "returning") {
        return Cow::Borrowed(sql);
    }
    Cow::Owned(format!("{trimmed} RETURNING *"))
}

fn leading_keyword(sql: &str) -> &str {
    let start = sql.trim_start();
    let end = start
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(start.len());
    &start[..end]
}

fn contains_keyword(sql: &str, keyword: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_for_variants_never_collide() {
        let plain = StatementKey::new("SELECT 1", PrepareVariant::Plain);
        let keyed = StatementKey::new("SELECT 1", PrepareVariant::ReturnGeneratedKeys);
        assert_ne!(plain, keyed);
        assert_eq!(plain.to_string(), "SELECT 1");
        assert_eq!(keyed.to_string(), "return_generated_keys::SELECT 1");
    }

    #[test]
    fn insert_gains_returning_clause() {
        let sql = "INSERT INTO client (name) VALUES ($1);";
        assert_eq!(
            with_returning_clause(sql),
            "INSERT INTO client (name) VALUES ($1) RETURNING *"
        );
    }

    #[test]
    fn existing_returning_and_selects_untouched() {
        let returning = "insert into t (a) values (?1) returning id";
        assert!(matches!(with_returning_clause(returning), Cow::Borrowed(_)));
        let select = "SELECT * FROM t";
        assert!(matches!(with_returning_clause(select), Cow::Borrowed(_)));
    }

    #[test]
    fn column_named_like_keyword_prefix_is_not_returning() {
        let sql = "UPDATE t SET returning_customer = $1";
        assert_eq!(
            with_returning_clause(sql),
            "UPDATE t SET returning_customer = $1 RETURNING *"
        );
    }
}
