use std::sync::Arc;

use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::SqlConnError;
use crate::results::ResultSet;

pub(super) type Reply<T> = oneshot::Sender<Result<T, SqlConnError>>;

pub(super) enum Command {
    Probe {
        respond_to: Reply<()>,
    },
    EnsureAutoCommit {
        respond_to: Reply<()>,
    },
    Prepare {
        query: Arc<String>,
        respond_to: Reply<()>,
    },
    Execute {
        query: Arc<String>,
        params: Vec<Value>,
        respond_to: Reply<usize>,
    },
    Query {
        query: Arc<String>,
        params: Vec<Value>,
        respond_to: Reply<ResultSet>,
    },
    /// Stop serving; the ack (if any) fires once the connection is closed.
    Shutdown {
        respond_to: Option<oneshot::Sender<()>>,
    },
}
