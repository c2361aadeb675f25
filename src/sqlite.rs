// SQLite backend for the connection manager
//
// Each connection is a dedicated worker thread that owns a `rusqlite::Connection`
// and serves commands sent over a channel; async callers await a oneshot reply.

pub mod backend;
pub mod config;
pub mod params;
pub mod query;
mod worker;

pub use backend::{SqliteBackend, SqliteConnection, SqliteStatement};
pub use config::{DEFAULT_STATEMENT_CACHE_CAPACITY, SqliteOptions, SqliteOptionsBuilder};
pub use params::{Params, row_value_to_sqlite_value};
pub use query::{build_result_set, sqlite_extract_value_sync};
