//! Worker pool configuration.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;
use crate::core::queue::{WaitTimeout, DEFAULT_CAPACITY};

/// Environment variable prefix read by [`WorkerPoolConfig::from_env`].
pub const ENV_PREFIX: &str = "TASKYARD_";

const MIN_STACK_SIZE: usize = 64 * 1024;

/// What `submit` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Wait until the queue has room. Every submission is eventually accepted.
    #[default]
    Block,
    /// Fail immediately with `PoolError::QueueFull`.
    Reject,
    /// Wait up to this many milliseconds, then fail with `PoolError::QueueTimeout`.
    BlockFor(u64),
}

impl AdmissionPolicy {
    /// Wait bound applied to the queue push.
    #[must_use]
    pub const fn queue_timeout(self) -> WaitTimeout {
        match self {
            Self::Block => WaitTimeout::Forever,
            Self::Reject => WaitTimeout::Immediate,
            Self::BlockFor(millis) => WaitTimeout::Within(Duration::from_millis(millis)),
        }
    }

    fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => other
                .strip_prefix("block_for:")
                .and_then(|millis| millis.trim().parse().ok())
                .map(Self::BlockFor)
                .ok_or_else(|| format!("unknown admission policy `{other}`")),
        }
    }
}

/// Configuration for a [`crate::core::WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Worker threads started by `start_default`; 0 means one per CPU.
    pub worker_count: usize,
    /// Maximum number of queued tasks.
    pub queue_capacity: usize,
    /// Behavior of `submit` on a full queue.
    pub admission: AdmissionPolicy,
    /// Longest a worker waits on an empty queue before re-checking the
    /// running flag.
    pub poll_interval_ms: u64,
    /// Worker thread names are `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size for each worker thread, in bytes.
    pub thread_stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            queue_capacity: DEFAULT_CAPACITY,
            admission: AdmissionPolicy::Block,
            poll_interval_ms: 5,
            thread_name_prefix: "taskyard-worker".into(),
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl WorkerPoolConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count (0 = one per CPU).
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the admission policy.
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Set the idle poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Idle poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Number of workers a `start` with this count resolves to.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        resolve_worker_count(self.worker_count)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
        }
        if self.admission == AdmissionPolicy::BlockFor(0) {
            return Err("block_for timeout must be greater than 0; use `reject` instead".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TASKYARD_*` environment variables, loading a
    /// `.env` file first if one exists.
    ///
    /// Recognized: `WORKER_COUNT`, `QUEUE_CAPACITY`, `ADMISSION`
    /// (`block`, `reject`, `block_for:<ms>`), `POLL_INTERVAL_MS`,
    /// `THREAD_NAME_PREFIX`, `THREAD_STACK_SIZE`.
    ///
    /// # Errors
    ///
    /// Fails if a variable does not parse or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup` (keys include the prefix).
    ///
    /// # Errors
    ///
    /// Fails if a variable does not parse or the result does not validate.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(value) = var("WORKER_COUNT") {
            cfg.worker_count = value.trim().parse().context("TASKYARD_WORKER_COUNT")?;
        }
        if let Some(value) = var("QUEUE_CAPACITY") {
            cfg.queue_capacity = value.trim().parse().context("TASKYARD_QUEUE_CAPACITY")?;
        }
        if let Some(value) = var("ADMISSION") {
            cfg.admission = AdmissionPolicy::parse(&value)
                .map_err(anyhow::Error::msg)
                .context("TASKYARD_ADMISSION")?;
        }
        if let Some(value) = var("POLL_INTERVAL_MS") {
            cfg.poll_interval_ms = value.trim().parse().context("TASKYARD_POLL_INTERVAL_MS")?;
        }
        if let Some(value) = var("THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = value;
        }
        if let Some(value) = var("THREAD_STACK_SIZE") {
            cfg.thread_stack_size = value.trim().parse().context("TASKYARD_THREAD_STACK_SIZE")?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

/// Resolve a requested worker count, mapping 0 to the number of CPUs.
#[must_use]
pub fn resolve_worker_count(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}
