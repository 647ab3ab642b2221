//! Units of work queued on a [`crate::core::WorkerPool`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use super::channel::{channel, Promise, ResultHandle};
use crate::util::clock::Timestamp;

/// What happened to a task once a worker dequeued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// The body ran and its value was delivered.
    Completed,
    /// The body panicked; carries the rendered panic message.
    Failed(String),
    /// The deadline had passed at dequeue time; the body never ran.
    Expired,
}

/// Type-erased body of a task together with the promise for its result.
trait Job: Send {
    fn run(self: Box<Self>) -> Result<(), String>;
    fn expire(self: Box<Self>);
}

struct Packaged<F, R> {
    func: F,
    promise: Promise<R>,
}

impl<F, R> Job for Packaged<F, R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    fn run(self: Box<Self>) -> Result<(), String> {
        let Self { func, promise } = *self;
        match panic::catch_unwind(AssertUnwindSafe(func)) {
            Ok(value) => {
                promise.resolve(value);
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                promise.fail(message.clone());
                Err(message)
            }
        }
    }

    fn expire(self: Box<Self>) {
        self.promise.expire();
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A callable with an optional absolute deadline.
///
/// A task is owned by exactly one queue slot until a single worker dequeues
/// it. Dropping a task without running it resolves its handle as discarded.
pub struct Task {
    job: Box<dyn Job>,
    deadline: Option<Timestamp>,
}

impl Task {
    /// Package `func` into a task and return the handle its result will
    /// arrive on.
    pub fn new<F, R>(func: F, deadline: Option<Timestamp>) -> (Self, ResultHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, handle) = channel();
        let task = Self {
            job: Box::new(Packaged { func, promise }),
            deadline,
        };
        (task, handle)
    }

    /// Deadline after which the task is dropped instead of run.
    pub const fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    /// Whether the deadline lies strictly before `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.deadline.is_some_and(|deadline| deadline < now)
    }

    /// Run the body if the task has not expired at `now`, otherwise resolve
    /// it as expired. Panics in the body are caught and delivered as failures.
    pub fn execute(self, now: Timestamp) -> TaskOutcome {
        if self.is_expired(now) {
            self.job.expire();
            return TaskOutcome::Expired;
        }
        match self.job.run() {
            Ok(()) => TaskOutcome::Completed,
            Err(message) => TaskOutcome::Failed(message),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
