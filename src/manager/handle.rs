use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{ConnectionBackend, PrepareVariant, StatementKey};

/// The live session owned by a [`ConnectionManager`](crate::ConnectionManager).
///
/// Callers may hold on to the `Arc`, but only the manager closes it. `id` is unique
/// per manager: a replacement session always gets a new one.
pub struct ConnectionHandle<B: ConnectionBackend> {
    id: u64,
    conn: B::Connection,
}

impl<B: ConnectionBackend> ConnectionHandle<B> {
    pub(crate) fn new(id: u64, conn: B::Connection) -> Self {
        Self { id, conn }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The driver-level session.
    #[must_use]
    pub fn raw(&self) -> &B::Connection {
        &self.conn
    }
}

impl<B: ConnectionBackend> fmt::Debug for ConnectionHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A compiled statement from the manager's cache.
///
/// Holds the session it was compiled against; it is only reused while that
/// session is still the manager's current one.
pub struct PreparedStatement<B: ConnectionBackend> {
    key: StatementKey,
    statement: B::Statement,
    connection: Arc<ConnectionHandle<B>>,
    closed: AtomicBool,
}

impl<B: ConnectionBackend> PreparedStatement<B> {
    pub(crate) fn new(
        key: StatementKey,
        statement: B::Statement,
        connection: Arc<ConnectionHandle<B>>,
    ) -> Self {
        Self {
            key,
            statement,
            connection,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn key(&self) -> &StatementKey {
        &self.key
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        self.key.sql()
    }

    #[must_use]
    pub fn variant(&self) -> PrepareVariant {
        self.key.variant()
    }

    /// Id of the session this statement was compiled against.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.connection.id()
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionHandle<B>> {
        &self.connection
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The driver-level statement.
    #[must_use]
    pub fn raw(&self) -> &B::Statement {
        &self.statement
    }

    /// Returns `true` if this call closed it.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

impl<B: ConnectionBackend> fmt::Debug for PreparedStatement<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("key", &self.key.to_string())
            .field("connection_id", &self.connection.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
