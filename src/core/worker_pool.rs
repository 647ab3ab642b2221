//! Worker pool with dedicated OS threads pulling from a bounded queue.
//!
//! # Lifecycle
//!
//! A pool is created stopped. `start(n)` spawns `n` workers (0 = one per CPU)
//! and `stop()` joins them. Both are idempotent, and a stopped pool can be
//! started again. Tasks queued while the pool is stopped stay queued and run
//! after the next `start`. Dropping the pool stops it.
//!
//! # Worker loop
//!
//! Each worker waits on the queue for at most the configured poll interval,
//! so the running flag is re-checked even when no work arrives. A dequeued
//! task whose deadline is already behind the clock is resolved as expired
//! without running. Otherwise the body runs under `catch_unwind`, and a panic
//! is reported through the pool's [`ErrorReporter`](crate::util::ErrorReporter)
//! and delivered to the submitter as a failure. The worker survives either way.
//!
//! # Quiescence
//!
//! `wait` blocks until no task is queued or running. The pool counts every
//! accepted task from admission until it has finished, expired, or been
//! cleared, so a task that has just left the queue but not yet started still
//! counts as outstanding.
//!
//! # Example
//!
//! ```
//! use taskyard::config::WorkerPoolConfig;
//! use taskyard::core::{WaitTimeout, WorkerPool};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(2)).unwrap();
//! pool.start_default().unwrap();
//!
//! let handle = pool.submit(|| 6 * 7).unwrap();
//! assert_eq!(handle.wait(WaitTimeout::Forever), Ok(42));
//!
//! assert!(pool.wait(WaitTimeout::Forever));
//! pool.stop();
//! ```

mod threads;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use threads::WorkerPool;

/// Snapshot of pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks currently executing.
    pub active_tasks: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Tasks accepted into the queue.
    pub submitted_tasks: u64,
    /// Tasks whose body ran to completion.
    pub completed_tasks: u64,
    /// Tasks whose body panicked.
    pub failed_tasks: u64,
    /// Tasks dropped at dequeue because their deadline had passed.
    pub expired_tasks: u64,
    /// Submissions refused by the admission policy.
    pub rejected_tasks: u64,
    /// Queued tasks removed by `clear`.
    pub discarded_tasks: u64,
}

/// Internal counters for pool statistics.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub expired_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
    pub discarded_tasks: AtomicU64,
}

impl PoolCounters {
    /// Fill the counter fields of `stats` from the current values.
    pub fn snapshot_into(&self, stats: &mut PoolStats) {
        stats.submitted_tasks = self.submitted_tasks.load(Ordering::Relaxed);
        stats.completed_tasks = self.completed_tasks.load(Ordering::Relaxed);
        stats.failed_tasks = self.failed_tasks.load(Ordering::Relaxed);
        stats.expired_tasks = self.expired_tasks.load(Ordering::Relaxed);
        stats.rejected_tasks = self.rejected_tasks.load(Ordering::Relaxed);
        stats.discarded_tasks = self.discarded_tasks.load(Ordering::Relaxed);
    }

    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}
