use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::handle::PreparedStatement;
use crate::backend::{ConnectionBackend, StatementKey};

type Entries<B> = HashMap<StatementKey, Arc<PreparedStatement<B>>>;

/// Compiled statements keyed by `(variant, sql)`.
///
/// The lock is never held across an await; callers copy the `Arc` out.
pub(crate) struct StatementCache<B: ConnectionBackend> {
    entries: Mutex<Entries<B>>,
}

impl<B: ConnectionBackend> StatementCache<B> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries<B>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            // entries are plain Arcs, nothing can be left half-written
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn get(&self, key: &StatementKey) -> Option<Arc<PreparedStatement<B>>> {
        self.lock().get(key).cloned()
    }

    /// Insert or replace; returns the entry that was displaced.
    pub(crate) fn insert(
        &self,
        key: StatementKey,
        stmt: Arc<PreparedStatement<B>>,
    ) -> Option<Arc<PreparedStatement<B>>> {
        self.lock().insert(key, stmt)
    }

    /// Empty the cache, handing back everything it held.
    pub(crate) fn drain(&self) -> Vec<Arc<PreparedStatement<B>>> {
        self.lock().drain().map(|(_, stmt)| stmt).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
