//! A scriptable in-memory backend for exercising the connection manager
//! without a database.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sql_conn_manager::prelude::*;

/// Call counters plus failure knobs. Knobs named `failing_*`/`lost_*` fire
/// for the next N calls and then disarm.
#[derive(Debug, Default)]
pub struct Script {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub auto_commit_calls: AtomicUsize,
    pub probes: AtomicUsize,
    pub prepares: AtomicUsize,
    pub statement_closes: AtomicUsize,
    pub executes: AtomicUsize,
    pub queries: AtomicUsize,

    pub failing_connects: AtomicUsize,
    pub failing_auto_commits: AtomicUsize,
    /// Execute/query calls that report a lost session.
    pub lost_sessions: AtomicUsize,
    pub fail_closes: AtomicBool,
    pub probe_delay_ms: AtomicU64,
    pub connect_delay_ms: AtomicU64,
    /// Delay after the session check, before the statement is handed back.
    pub prepare_delay_ms: AtomicU64,
    pub affected_rows: AtomicUsize,
}

/// Route manager logs to the test harness output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn hit(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    pub script: Arc<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let script = Script::default();
        script.affected_rows.store(1, Ordering::SeqCst);
        Self {
            script: Arc::new(script),
        }
    }

    /// A manager over a fresh backend, plus a handle on the backend's script.
    pub fn manager() -> (Arc<ConnectionManager<ScriptedBackend>>, Arc<Script>) {
        Self::manager_with(ManagerOptions::default())
    }

    pub fn manager_with(
        options: ManagerOptions,
    ) -> (Arc<ConnectionManager<ScriptedBackend>>, Arc<Script>) {
        let backend = Self::new();
        let script = Arc::clone(&backend.script);
        (
            Arc::new(ConnectionManager::with_options(backend, options)),
            script,
        )
    }
}

#[derive(Debug)]
pub struct MockConnection {
    pub serial: usize,
    closed: AtomicBool,
    broken: AtomicBool,
}

impl MockConnection {
    /// Server side drops the session: not flagged closed locally, but every
    /// round trip fails.
    pub fn break_session(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// The client notices the socket is gone.
    pub fn close_locally(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> Result<(), SqlConnError> {
        if self.is_closed() || self.broken.load(Ordering::SeqCst) {
            return Err(lost(format!("session {} is gone", self.serial)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockStatement {
    pub sql: String,
    pub variant: PrepareVariant,
    pub serial: usize,
}

fn lost(message: String) -> SqlConnError {
    SqlConnError::recoverable(SqlConnError::ConnectionError(message))
}

async fn delay(ms: &AtomicU64) {
    let ms = ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ConnectionBackend for ScriptedBackend {
    type Connection = MockConnection;
    type Statement = MockStatement;

    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self) -> Result<MockConnection, SqlConnError> {
        delay(&self.script.connect_delay_ms).await;
        if take_one(&self.script.failing_connects) {
            return Err(SqlConnError::ConnectionError("connection refused".into()));
        }
        let serial = hit(&self.script.connects);
        Ok(MockConnection {
            serial,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        })
    }

    async fn enable_auto_commit(&self, _conn: &MockConnection) -> Result<(), SqlConnError> {
        hit(&self.script.auto_commit_calls);
        if take_one(&self.script.failing_auto_commits) {
            return Err(SqlConnError::ConnectionError("cannot set auto-commit".into()));
        }
        Ok(())
    }

    fn is_closed(&self, conn: &MockConnection) -> bool {
        conn.is_closed()
    }

    async fn is_valid(&self, conn: &MockConnection) -> Result<(), SqlConnError> {
        hit(&self.script.probes);
        delay(&self.script.probe_delay_ms).await;
        conn.check_alive()
    }

    async fn prepare(
        &self,
        conn: &MockConnection,
        sql: &str,
        variant: PrepareVariant,
    ) -> Result<MockStatement, SqlConnError> {
        hit(&self.script.prepares);
        conn.check_alive()?;
        delay(&self.script.prepare_delay_ms).await;
        let verb = sql.split_whitespace().next().unwrap_or_default();
        if !["SELECT", "INSERT", "UPDATE", "DELETE"]
            .iter()
            .any(|ok| verb.eq_ignore_ascii_case(ok))
        {
            return Err(SqlConnError::ExecutionError(format!(
                "syntax error at or near \"{verb}\""
            )));
        }
        Ok(MockStatement {
            sql: sql.to_owned(),
            variant,
            serial: conn.serial,
        })
    }

    async fn close_statement(
        &self,
        _conn: &MockConnection,
        _stmt: &MockStatement,
    ) -> Result<(), SqlConnError> {
        hit(&self.script.statement_closes);
        if self.script.fail_closes.load(Ordering::SeqCst) {
            return Err(SqlConnError::ConnectionError("statement close failed".into()));
        }
        Ok(())
    }

    async fn close(&self, conn: &MockConnection) -> Result<(), SqlConnError> {
        hit(&self.script.closes);
        conn.close_locally();
        if self.script.fail_closes.load(Ordering::SeqCst) {
            return Err(SqlConnError::ConnectionError("close failed".into()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        conn: &MockConnection,
        stmt: &MockStatement,
        _params: &[RowValues],
    ) -> Result<usize, SqlConnError> {
        hit(&self.script.executes);
        if take_one(&self.script.lost_sessions) {
            return Err(lost("socket reset by peer".into()));
        }
        conn.check_alive()?;
        assert_eq!(stmt.serial, conn.serial, "statement used on a foreign session");
        Ok(count(&self.script.affected_rows))
    }

    async fn query(
        &self,
        conn: &MockConnection,
        stmt: &MockStatement,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlConnError> {
        hit(&self.script.queries);
        if take_one(&self.script.lost_sessions) {
            return Err(lost("socket reset by peer".into()));
        }
        conn.check_alive()?;
        assert_eq!(stmt.serial, conn.serial, "statement used on a foreign session");

        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec![
            "connection".to_string(),
            "variant".to_string(),
            "param_count".to_string(),
        ]));
        rs.add_row_values(vec![
            RowValues::Int(i64::try_from(conn.serial).unwrap_or(i64::MAX)),
            RowValues::Text(stmt.variant.to_string()),
            RowValues::Int(i64::try_from(params.len()).unwrap_or(i64::MAX)),
        ]);
        Ok(rs)
    }
}
