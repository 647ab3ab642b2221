//! Builder for worker pools with pluggable clock and error reporter.

use std::sync::Arc;

use crate::config::{AdmissionPolicy, WorkerPoolConfig};
use crate::core::{PoolError, WorkerPool};
use crate::util::{Clock, ErrorReporter, MonotonicClock, TracingReporter};

/// Assembles a [`WorkerPool`] from configuration plus optional clock and
/// error reporter overrides.
pub struct WorkerPoolBuilder {
    config: WorkerPoolConfig,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
}

impl WorkerPoolBuilder {
    /// Builder with default configuration, the monotonic clock and the
    /// tracing reporter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: WorkerPoolConfig::default(),
            clock: Arc::new(MonotonicClock),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: WorkerPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Worker count for `start_default` (0 = one per CPU).
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Behavior of `submit` on a full queue.
    #[must_use]
    pub fn admission(mut self, admission: AdmissionPolicy) -> Self {
        self.config.admission = admission;
        self
    }

    /// Clock used for deadlines.
    #[must_use]
    pub fn clock(self, clock: impl Clock) -> Self {
        self.clock_arc(Arc::new(clock))
    }

    /// Shared clock used for deadlines, for callers that keep a handle to it.
    #[must_use]
    pub fn clock_arc(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sink for task failures.
    #[must_use]
    pub fn reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Configuration accumulated so far.
    pub const fn current_config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Build a stopped pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn build(self) -> Result<WorkerPool, PoolError> {
        WorkerPool::with_parts(self.config, self.clock, self.reporter)
    }

    /// Build a pool and start it with the configured worker count.
    ///
    /// # Errors
    ///
    /// Configuration or thread spawn failures.
    pub fn build_started(self) -> Result<WorkerPool, PoolError> {
        let pool = self.build()?;
        pool.start_default()?;
        Ok(pool)
    }
}

impl Default for WorkerPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool {
    /// Start building a pool.
    #[must_use]
    pub fn builder() -> WorkerPoolBuilder {
        WorkerPoolBuilder::new()
    }
}
