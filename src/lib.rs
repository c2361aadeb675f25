#![doc = include_str!("../docs/README.md")]

pub mod backend;
pub mod binder;
pub mod config;
pub mod error;
pub mod manager;
pub mod prelude;
pub mod results;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use backend::{ConnectionBackend, PrepareVariant, StatementKey, with_returning_clause};
pub use binder::{BoundParams, StatementBinder, no_params};
pub use config::{DEFAULT_VALIDATION_TIMEOUT, ManagerOptions, ManagerOptionsBuilder};
pub use error::{ErrorClass, SqlConnError};
pub use manager::{ConnectionHandle, ConnectionManager, ManagerStats, PreparedStatement};
pub use results::{CustomDbRow, ResultSet};
pub use types::RowValues;

#[cfg(feature = "postgres")]
pub use postgres::{PgBackend, PgOptions};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteOptions};
