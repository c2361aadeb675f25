use std::time::Duration;

/// Default bound on a single liveness probe.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Options shared by every [`ConnectionManager`](crate::ConnectionManager), independent of backend.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Upper bound on the liveness probe run before a connection is handed out.
    /// A probe that does not answer in time counts as a failed probe.
    pub validation_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }
}

impl ManagerOptions {
    #[must_use]
    pub fn builder() -> ManagerOptionsBuilder {
        ManagerOptionsBuilder::default()
    }
}

/// Fluent builder for [`ManagerOptions`].
#[derive(Debug, Clone, Default)]
pub struct ManagerOptionsBuilder {
    opts: ManagerOptions,
}

impl ManagerOptionsBuilder {
    #[must_use]
    pub fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.opts.validation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn finish(self) -> ManagerOptions {
        self.opts
    }
}
