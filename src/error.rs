use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlConnError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// The session was lost while an operation was in flight. Execute helpers
    /// answer this with a single reconnect-and-retry.
    #[error("Recoverable connection error: {0}")]
    Recoverable(#[source] Box<SqlConnError>),

    /// Opening a (replacement) connection failed. Nothing below the caller
    /// retries this.
    #[error("Failed to open connection: {0}")]
    ConnectFailed(#[source] Box<SqlConnError>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

/// Retry class of an error, as seen by the execute helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Lost session; worth exactly one reconnect and retry.
    Recoverable,
    /// Everything else; returned to the caller untouched.
    Fatal,
}

impl SqlConnError {
    /// Wrap an error as a lost-session failure.
    #[must_use]
    pub fn recoverable(err: impl Into<SqlConnError>) -> Self {
        SqlConnError::Recoverable(Box::new(err.into()))
    }

    /// Wrap an error as a failed connection open.
    #[must_use]
    pub fn connect_failed(err: impl Into<SqlConnError>) -> Self {
        match err.into() {
            already @ SqlConnError::ConnectFailed(_) => already,
            other => SqlConnError::ConnectFailed(Box::new(other)),
        }
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            SqlConnError::Recoverable(_) => ErrorClass::Recoverable,
            _ => ErrorClass::Fatal,
        }
    }

    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    /// The driver error underneath any `Recoverable`/`ConnectFailed` wrapping.
    #[must_use]
    pub fn root(&self) -> &SqlConnError {
        match self {
            SqlConnError::Recoverable(inner) | SqlConnError::ConnectFailed(inner) => inner.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recoverable_variant_is_retried() {
        let lost = SqlConnError::recoverable(SqlConnError::ConnectionError("reset".into()));
        assert_eq!(lost.class(), ErrorClass::Recoverable);
        assert!(lost.is_recoverable());

        let syntax = SqlConnError::ExecutionError("syntax error at or near".into());
        assert_eq!(syntax.class(), ErrorClass::Fatal);

        let open = SqlConnError::connect_failed(SqlConnError::ConnectionError("refused".into()));
        assert_eq!(open.class(), ErrorClass::Fatal);
    }

    #[test]
    fn connect_failed_is_not_double_wrapped() {
        let once = SqlConnError::connect_failed(SqlConnError::Other("boom".into()));
        let twice = SqlConnError::connect_failed(once);
        match twice {
            SqlConnError::ConnectFailed(inner) => {
                assert!(matches!(*inner, SqlConnError::Other(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn root_unwraps_to_original_error() {
        let err = SqlConnError::recoverable(SqlConnError::ConnectionError("worker gone".into()));
        assert!(matches!(err.root(), SqlConnError::ConnectionError(msg) if msg == "worker gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
