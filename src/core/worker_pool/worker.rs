//! State shared between a pool and its workers, and the worker loop itself.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};
use uuid::Uuid;

use super::PoolCounters;
use crate::core::queue::{BoundedBlockingQueue, WaitTimeout};
use crate::core::task::{panic_message, Task, TaskOutcome};
use crate::util::{Clock, ErrorReporter};

/// Everything the workers and the owning pool both touch.
pub(super) struct PoolShared {
    pub id: Uuid,
    pub queue: BoundedBlockingQueue<Task>,
    pub running: AtomicBool,
    /// Bumped by every `stop`. A worker serves only the generation it was
    /// spawned for.
    pub generation: AtomicU64,
    /// Tasks whose body is executing right now.
    pub active: AtomicUsize,
    /// Tasks accepted and not yet finished, expired or cleared.
    pub outstanding: AtomicUsize,
    pub idle_lock: Mutex<()>,
    pub idle: Condvar,
    pub counters: PoolCounters,
    pub clock: Arc<dyn Clock>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub poll_interval: Duration,
}

impl PoolShared {
    /// Whether a worker spawned for `generation` should keep serving.
    pub fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    pub fn is_quiescent(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Wake every `wait` caller. Taking the idle lock orders this after any
    /// waiter's predicate check.
    pub fn wake_waiters(&self) {
        let _guard = self.idle_lock.lock();
        self.idle.notify_all();
    }

    pub fn notify_if_quiescent(&self) {
        if self.is_quiescent() {
            self.wake_waiters();
        }
    }

    /// Retire `count` outstanding tasks and wake waiters if none remain.
    pub fn retire(&self, count: usize) {
        if count == 0 {
            return;
        }
        let previous = self.outstanding.fetch_sub(count, Ordering::SeqCst);
        debug_assert!(previous >= count, "outstanding task count underflow");
        if previous == count {
            self.wake_waiters();
        }
    }

    fn record(&self, worker_id: usize, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => {
                PoolCounters::bump(&self.counters.completed_tasks, 1);
            }
            TaskOutcome::Expired => {
                PoolCounters::bump(&self.counters.expired_tasks, 1);
                debug!(pool = %self.id, worker_id, "task expired before start, discarded");
            }
            TaskOutcome::Failed(message) => {
                PoolCounters::bump(&self.counters.failed_tasks, 1);
                let context = format!("pool {} worker {worker_id}", self.id);
                let reported = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.reporter.report(&context, &message);
                }));
                if let Err(payload) = reported {
                    error!(
                        pool = %self.id,
                        worker_id,
                        task_error = %message,
                        reporter_error = %panic_message(payload.as_ref()),
                        "error reporter panicked"
                    );
                }
            }
        }
    }
}

/// Spawn one worker thread.
pub(super) fn spawn_worker(
    worker_id: usize,
    generation: u64,
    shared: Arc<PoolShared>,
    name_prefix: &str,
    stack_size: usize,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{name_prefix}-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || run_worker(worker_id, generation, &shared))
}

/// WAITING -> RUNNING -> WAITING until the pool stops or moves on to a newer
/// generation.
fn run_worker(worker_id: usize, generation: u64, shared: &PoolShared) {
    debug!(pool = %shared.id, worker_id, generation, "worker started");
    let poll = WaitTimeout::Within(shared.poll_interval);

    while shared.is_current(generation) {
        let Some(task) = shared.queue.pop(poll) else {
            shared.notify_if_quiescent();
            continue;
        };

        shared.active.fetch_add(1, Ordering::SeqCst);
        trace!(pool = %shared.id, worker_id, deadline = ?task.deadline(), "worker running task");
        let outcome = task.execute(shared.clock.now());
        shared.active.fetch_sub(1, Ordering::SeqCst);

        shared.record(worker_id, outcome);
        shared.retire(1);
    }

    debug!(pool = %shared.id, worker_id, generation, "worker stopped");
}
