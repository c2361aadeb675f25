//! Materialised query results handed to callers.
//!
//! A [`ResultSet`] is fully owned by the caller once an execute helper returns it;
//! the connection manager keeps no reference to it.

mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::CustomDbRow;
