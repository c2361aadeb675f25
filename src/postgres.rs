// PostgreSQL backend for the connection manager
//
// - config: connection target and validation
// - backend: `ConnectionBackend` over a tokio-postgres client
// - params: `RowValues` -> `ToSql`
// - query: row extraction into `ResultSet`

pub mod backend;
pub mod config;
pub mod params;
pub mod query;

pub use backend::{PgBackend, PgConnection};
pub use config::{PgOptions, PgOptionsBuilder};
pub use params::Params;
pub use query::build_result_set_from_statement;
