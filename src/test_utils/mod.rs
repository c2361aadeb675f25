/// Test utilities for `PostgreSQL` integration tests
pub mod postgres;

pub use postgres::*;
