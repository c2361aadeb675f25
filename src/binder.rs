//! Parameter binding for cached statements.
//!
//! Cached statements are shared, their parameters are not. Every execution starts
//! from an empty [`BoundParams`] and asks the caller's [`StatementBinder`] to fill it.

use crate::error::SqlConnError;
use crate::types::RowValues;

/// Positional parameter buffer filled by a [`StatementBinder`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    values: Vec<RowValues>,
}

impl BoundParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every bound value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Bind the next positional parameter.
    pub fn push(&mut self, value: impl Into<RowValues>) -> &mut Self {
        self.values.push(value.into());
        self
    }

    /// Bind parameter `position` (1-based, as in `$1` / `?1`). Gaps are filled with NULL.
    ///
    /// # Errors
    /// Returns `SqlConnError::ParameterError` when `position` is 0.
    pub fn set(&mut self, position: usize, value: impl Into<RowValues>) -> Result<&mut Self, SqlConnError> {
        if position == 0 {
            return Err(SqlConnError::ParameterError(
                "parameter positions start at 1".to_string(),
            ));
        }
        if self.values.len() < position {
            self.values.resize(position, RowValues::Null);
        }
        self.values[position - 1] = value.into();
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[RowValues] {
        &self.values
    }
}

impl From<Vec<RowValues>> for BoundParams {
    fn from(values: Vec<RowValues>) -> Self {
        Self { values }
    }
}

/// Binds every parameter of a statement before it runs.
///
/// # Re-invocation contract
///
/// An execute helper calls `bind` once per attempt, and there are up to two
/// attempts (the second follows a forced reconnect). Implementations must
/// therefore be idempotent: bind the same values each time and have no side
/// effects that must not happen twice. The buffer is always empty on entry.
///
/// Any `Fn(&mut BoundParams) -> Result<(), SqlConnError>` closure is a binder:
/// ```rust
/// use sql_conn_manager::prelude::*;
///
/// let id = 42_i64;
/// let binder = move |p: &mut BoundParams| -> Result<(), SqlConnError> {
///     p.push(id).push("renamed");
///     Ok(())
/// };
/// let mut params = BoundParams::new();
/// binder.bind(&mut params).unwrap();
/// assert_eq!(params.len(), 2);
/// ```
pub trait StatementBinder: Send + Sync {
    /// Bind all parameters into `params`.
    ///
    /// # Errors
    /// Whatever the binder decides is a binding failure; it is returned as is
    /// and never retried.
    fn bind(&self, params: &mut BoundParams) -> Result<(), SqlConnError>;
}

impl<F> StatementBinder for F
where
    F: Fn(&mut BoundParams) -> Result<(), SqlConnError> + Send + Sync,
{
    fn bind(&self, params: &mut BoundParams) -> Result<(), SqlConnError> {
        self(params)
    }
}

/// Binds a fixed list of values.
impl StatementBinder for Vec<RowValues> {
    fn bind(&self, params: &mut BoundParams) -> Result<(), SqlConnError> {
        for value in self {
            params.push(value.clone());
        }
        Ok(())
    }
}

/// Binder for statements without parameters.
#[must_use]
pub fn no_params() -> impl StatementBinder {
    |_: &mut BoundParams| -> Result<(), SqlConnError> { Ok(()) }
}
