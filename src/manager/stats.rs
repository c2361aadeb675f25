use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of a manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    /// Sessions opened, including the first one.
    pub connections_opened: u64,
    /// Liveness probes that failed or timed out.
    pub probe_failures: u64,
    /// Reconnects forced by `force_reconnect` (directly or by a retry).
    pub forced_reconnects: u64,
    /// Execute calls that hit a recoverable error and ran their second attempt.
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Errors swallowed while closing stale statements or sessions.
    pub cleanup_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) connections_opened: AtomicU64,
    pub(crate) probe_failures: AtomicU64,
    pub(crate) forced_reconnects: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
    pub(crate) cleanup_failures: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl StatsCounters {
    pub(crate) fn snapshot(&self) -> ManagerStats {
        ManagerStats {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            forced_reconnects: self.forced_reconnects.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
        }
    }
}
