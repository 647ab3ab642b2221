//! `WorkerPool` on dedicated OS threads.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::worker::{spawn_worker, PoolShared};
use super::{PoolCounters, PoolStats};
use crate::config::{resolve_worker_count, WorkerPoolConfig};
use crate::core::channel::ResultHandle;
use crate::core::error::PoolError;
use crate::core::queue::{wait_while, BoundedBlockingQueue, WaitTimeout};
use crate::core::task::Task;
use crate::util::{Clock, ErrorReporter, MonotonicClock, Timestamp, TracingReporter};

/// Fixed-size pool of worker threads fed by a bounded task queue.
///
/// Share it between submitting threads with `Arc<WorkerPool>`.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    shared: Arc<PoolShared>,
    pool_size: AtomicUsize,
    /// Worker handles. The lock also serializes `start` and `stop`.
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Workers that stopped the pool from inside a task and could not join
    /// themselves. Joined by the next `start` or by `Drop`.
    retiring: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a stopped pool using the monotonic clock and the tracing
    /// error reporter.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        Self::with_parts(config, Arc::new(MonotonicClock), Arc::new(TracingReporter))
    }

    /// Create a stopped pool with an explicit clock and error reporter.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn with_parts(
        config: WorkerPoolConfig,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let shared = Arc::new(PoolShared {
            id: Uuid::new_v4(),
            queue: BoundedBlockingQueue::new(config.queue_capacity),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            counters: PoolCounters::default(),
            clock,
            reporter,
            poll_interval: config.poll_interval(),
        });

        debug!(
            pool = %shared.id,
            queue_capacity = config.queue_capacity,
            admission = ?config.admission,
            "worker pool created"
        );

        Ok(Self {
            config,
            shared,
            pool_size: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
            retiring: Mutex::new(Vec::new()),
        })
    }

    /// Start `workers` threads (0 = one per CPU). No-op if already running.
    ///
    /// A worker that stopped the pool from inside its task is joined first,
    /// so it never serves alongside the new workers.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Spawn` if a thread could not be created. Any
    /// workers spawned before the failure are stopped again.
    pub fn start(&self, workers: usize) -> Result<(), PoolError> {
        self.join_retiring();

        let mut handles = self.workers.lock();
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let count = resolve_worker_count(workers);
        let generation = self.shared.generation.load(Ordering::Acquire);
        handles.clear();
        for worker_id in 0..count {
            match spawn_worker(
                worker_id,
                generation,
                Arc::clone(&self.shared),
                &self.config.thread_name_prefix,
                self.config.thread_stack_size,
            ) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.shared.running.store(false, Ordering::Release);
                    self.shared.generation.fetch_add(1, Ordering::AcqRel);
                    join_all(std::mem::take(&mut *handles));
                    error!(pool = %self.shared.id, worker_id, error = %e, "failed to spawn worker");
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        self.pool_size.store(count, Ordering::Release);
        info!(
            pool = %self.shared.id,
            worker_count = count,
            queued = self.shared.queue.len(),
            "worker pool started"
        );
        Ok(())
    }

    /// Start with the configured worker count.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_default(&self) -> Result<(), PoolError> {
        self.start(self.config.worker_count)
    }

    /// Stop all workers and join them. No-op if not running.
    ///
    /// Workers finish the task they are running; queued tasks stay queued.
    /// Called from inside a task, the calling worker cannot join itself: it
    /// takes no further tasks and is joined by the next `start` or by `Drop`.
    pub fn stop(&self) {
        let mut handles = self.workers.lock();
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::AcqRel);

        let worker_count = handles.len();
        let unjoined = join_all(std::mem::take(&mut *handles));
        self.retiring.lock().extend(unjoined);
        self.pool_size.store(0, Ordering::Release);
        self.shared.wake_waiters();

        info!(
            pool = %self.shared.id,
            worker_count,
            queued = self.shared.queue.len(),
            "worker pool stopped"
        );
    }

    fn join_retiring(&self) {
        let pending = std::mem::take(&mut *self.retiring.lock());
        if pending.is_empty() {
            return;
        }
        let unjoined = join_all(pending);
        self.retiring.lock().extend(unjoined);
    }

    /// Submit a task without a deadline.
    ///
    /// # Errors
    ///
    /// `PoolError::QueueFull` or `PoolError::QueueTimeout` depending on the
    /// admission policy when the queue has no room.
    pub fn submit<F, R>(&self, func: F) -> Result<ResultHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit_with_deadline(func, None)
    }

    /// Submit a task that is dropped unrun if still queued `ttl` from now.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_with_ttl<F, R>(&self, func: F, ttl: Duration) -> Result<ResultHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let deadline = self.now().saturating_add(ttl);
        self.submit_with_deadline(func, Some(deadline))
    }

    /// Submit a task with an optional absolute deadline on this pool's clock.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_with_deadline<F, R>(
        &self,
        func: F,
        deadline: Option<Timestamp>,
    ) -> Result<ResultHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, handle) = Task::new(func, deadline);
        self.enqueue(task, self.config.admission.queue_timeout())?;
        Ok(handle)
    }

    /// Submit without waiting for queue space, whatever the admission policy.
    ///
    /// # Errors
    ///
    /// `PoolError::QueueFull` if the queue is at capacity.
    pub fn try_submit<F, R>(&self, func: F) -> Result<ResultHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, handle) = Task::new(func, None);
        self.enqueue(task, WaitTimeout::Immediate)?;
        Ok(handle)
    }

    fn enqueue(&self, task: Task, timeout: WaitTimeout) -> Result<(), PoolError> {
        let shared = &self.shared;
        shared.outstanding.fetch_add(1, Ordering::SeqCst);

        match shared.queue.push_timeout(task, timeout) {
            Ok(()) => {
                PoolCounters::bump(&shared.counters.submitted_tasks, 1);
                Ok(())
            }
            Err(err) => {
                let full = err.is_full();
                drop(err.into_inner());
                shared.retire(1);
                PoolCounters::bump(&shared.counters.rejected_tasks, 1);
                warn!(
                    pool = %shared.id,
                    queued = shared.queue.len(),
                    capacity = shared.queue.capacity(),
                    reason = if full { "full" } else { "timeout" },
                    "task rejected"
                );
                Err(if full {
                    PoolError::QueueFull
                } else {
                    PoolError::QueueTimeout
                })
            }
        }
    }

    /// Block until no task is queued or running, or `timeout` runs out.
    ///
    /// Returns whether the pool was quiescent on return. A stopped pool is
    /// not waited on: the current state is returned immediately.
    pub fn wait(&self, timeout: WaitTimeout) -> bool {
        let shared = &self.shared;
        let mut guard = shared.idle_lock.lock();
        if shared.running.load(Ordering::Acquire) {
            wait_while(&shared.idle, &mut guard, timeout, |_| {
                !shared.is_quiescent() && shared.running.load(Ordering::Acquire)
            });
        }
        shared.is_quiescent()
    }

    /// Remove every queued task without running it and return how many were
    /// removed. Their handles resolve as discarded.
    pub fn clear(&self) -> usize {
        let removed = self.shared.queue.drain();
        let count = removed.len();
        drop(removed);
        PoolCounters::bump(&self.shared.counters.discarded_tasks, count as u64);
        self.shared.retire(count);
        if count > 0 {
            debug!(pool = %self.shared.id, count, "queued tasks cleared");
        }
        count
    }

    /// Current reading of the pool's clock; use it to build deadlines.
    pub fn now(&self) -> Timestamp {
        self.shared.clock.now()
    }

    /// Number of worker threads while running, 0 when stopped.
    pub fn pools(&self) -> usize {
        self.pool_size.load(Ordering::Acquire)
    }

    /// Number of queued tasks.
    pub fn tasks(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of tasks executing right now.
    pub fn actives(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Whether the pool is running.
    pub fn is_started(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Replace the queue capacity and return the previous one (0 = query only).
    pub fn set_capacity(&self, capacity: usize) -> usize {
        self.shared.queue.set_capacity(capacity)
    }

    /// Identifier used in this pool's log events.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Configuration the pool was built with.
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            worker_count: self.pools(),
            active_tasks: self.actives(),
            queued_tasks: self.tasks(),
            queue_capacity: self.capacity(),
            ..PoolStats::default()
        };
        self.shared.counters.snapshot_into(&mut stats);
        stats
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
        self.join_retiring();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.shared.id)
            .field("running", &self.is_started())
            .field("pools", &self.pools())
            .field("tasks", &self.tasks())
            .field("actives", &self.actives())
            .finish_non_exhaustive()
    }
}

/// Join every handle except the calling thread's own, which is returned.
fn join_all(handles: Vec<JoinHandle<()>>) -> Vec<JoinHandle<()>> {
    let current = thread::current().id();
    let mut unjoined = Vec::new();
    for handle in handles {
        if handle.thread().id() == current {
            debug!(worker = ?handle.thread().name(), "stop called from a worker; joining it later");
            unjoined.push(handle);
            continue;
        }
        if handle.join().is_err() {
            warn!("worker thread panicked");
        }
    }
    unjoined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionPolicy;
    use crate::core::ChannelError;
    use crate::util::ManualClock;
    use std::sync::atomic::AtomicU64;

    fn small_pool(workers: usize) -> WorkerPool {
        let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(workers)).unwrap();
        pool.start_default().unwrap();
        pool
    }

    #[test]
    fn test_start_is_idempotent() {
        let pool = small_pool(2);
        pool.start(8).unwrap();
        assert_eq!(pool.pools(), 2);
        assert!(pool.is_started());
        pool.stop();
        pool.stop();
        assert!(!pool.is_started());
        assert_eq!(pool.pools(), 0);
    }

    #[test]
    fn test_zero_workers_uses_cpu_count() {
        let pool = WorkerPool::new(WorkerPoolConfig::new()).unwrap();
        pool.start(0).unwrap();
        assert_eq!(pool.pools(), num_cpus::get().max(1));
    }

    #[test]
    fn test_submit_and_wait() {
        let pool = small_pool(2);
        let handle = pool.submit(|| "hello".len()).unwrap();
        assert_eq!(handle.wait(WaitTimeout::Forever), Ok(5));
        assert!(pool.wait(WaitTimeout::Forever));

        let stats = pool.stats();
        assert_eq!(stats.submitted_tasks, 1);
        assert_eq!(stats.completed_tasks, 1);
    }

    #[test]
    fn test_expiry_uses_pool_clock() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let pool = WorkerPool::with_parts(
            WorkerPoolConfig::new().with_worker_count(1),
            clock.clone(),
            Arc::new(TracingReporter),
        )
        .unwrap();

        let ran = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ran);
        let handle = pool
            .submit_with_ttl(move || counter.fetch_add(1, Ordering::SeqCst), Duration::from_millis(10))
            .unwrap();

        clock.advance(Duration::from_millis(11));
        pool.start_default().unwrap();

        assert_eq!(handle.wait(WaitTimeout::Forever), Err(ChannelError::Expired));
        assert!(pool.wait(WaitTimeout::Forever));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().expired_tasks, 1);
    }

    #[test]
    fn test_reject_policy_on_full_queue() {
        let pool = WorkerPool::new(
            WorkerPoolConfig::new()
                .with_queue_capacity(1)
                .with_admission(AdmissionPolicy::Reject),
        )
        .unwrap();

        let _first = pool.submit(|| ()).unwrap();
        assert!(matches!(pool.submit(|| ()), Err(PoolError::QueueFull)));
        assert_eq!(pool.tasks(), 1);
        assert_eq!(pool.stats().rejected_tasks, 1);
    }

    #[test]
    fn test_block_for_policy_times_out() {
        let pool = WorkerPool::new(
            WorkerPoolConfig::new()
                .with_queue_capacity(1)
                .with_admission(AdmissionPolicy::BlockFor(20)),
        )
        .unwrap();

        let _first = pool.submit(|| ()).unwrap();
        assert!(matches!(pool.submit(|| ()), Err(PoolError::QueueTimeout)));
        assert!(matches!(pool.try_submit(|| ()), Err(PoolError::QueueFull)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = WorkerPool::new(WorkerPoolConfig::new().with_queue_capacity(0)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_wait_on_stopped_pool_returns_immediately() {
        let pool = WorkerPool::new(WorkerPoolConfig::new()).unwrap();
        assert!(pool.wait(WaitTimeout::Forever));
        let _pending = pool.submit(|| ()).unwrap();
        assert!(!pool.wait(WaitTimeout::Forever));
    }

    #[test]
    fn test_clear_discards_queued_tasks() {
        let pool = WorkerPool::new(WorkerPoolConfig::new()).unwrap();
        let handles: Vec<_> = (0..3).map(|i| pool.submit(move || i).unwrap()).collect();
        assert_eq!(pool.clear(), 3);
        assert_eq!(pool.tasks(), 0);
        assert!(pool.wait(WaitTimeout::Immediate));
        for handle in handles {
            assert_eq!(handle.try_get(), Err(ChannelError::Discarded));
        }
        assert_eq!(pool.stats().discarded_tasks, 3);
    }

    #[test]
    fn test_stop_from_inside_a_task() {
        let pool = Arc::new(small_pool(1));
        let inner = Arc::clone(&pool);
        let handle = pool.submit(move || inner.stop()).unwrap();
        assert_eq!(handle.wait(WaitTimeout::Within(Duration::from_secs(5))), Ok(()));
        assert!(!pool.is_started());

        pool.start(1).unwrap();
        assert!(pool.retiring.lock().is_empty());
        assert_eq!(pool.submit(|| 3).unwrap().wait(WaitTimeout::Forever), Ok(3));
    }
}
