//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::backend::{ConnectionBackend, PrepareVariant};
pub use crate::binder::{BoundParams, StatementBinder, no_params};
pub use crate::config::ManagerOptions;
pub use crate::error::{ErrorClass, SqlConnError};
pub use crate::manager::{ConnectionHandle, ConnectionManager, ManagerStats, PreparedStatement};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::types::RowValues;

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgBackend, PgOptions};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteBackend, SqliteOptions};
