//! Error types for queue, channel and pool operations.

use std::fmt;

use thiserror::Error;

/// Why a push into a [`crate::core::BoundedBlockingQueue`] did not happen.
///
/// The rejected item is handed back so the caller can retry without cloning.
pub enum PushError<T> {
    /// The queue was at capacity.
    Full(T),
    /// A timed push waited for space and gave up.
    Timeout(T),
}

impl<T> PushError<T> {
    /// Recover the item that was not pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Timeout(item) => item,
        }
    }

    /// Whether this error came from a full queue on a non-blocking push.
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Whether this error came from a timed push running out of time.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Timeout(_) => f.write_str("Timeout(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "queue is full"),
            Self::Timeout(_) => write!(f, "timed out waiting for queue space"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Outcomes of waiting on a [`crate::core::ResultHandle`] other than a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The task's deadline had passed when a worker dequeued it.
    #[error("task expired before it started")]
    Expired,
    /// The task body panicked; the message is the rendered panic payload.
    #[error("task failed: {0}")]
    Failed(String),
    /// The task was dropped without running (queue cleared or pool dropped).
    #[error("task discarded before it ran")]
    Discarded,
    /// No outcome arrived within the wait bound. The handle can be waited on again.
    #[error("timed out waiting for task result")]
    Timeout,
    /// The outcome was already taken by an earlier wait.
    #[error("result already consumed")]
    Consumed,
}

/// Errors produced by [`crate::core::WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The queue is full and the admission policy rejects instead of waiting.
    #[error("task queue is full")]
    QueueFull,
    /// The admission policy waited for queue space and gave up.
    #[error("timed out waiting for queue space")]
    QueueTimeout,
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
