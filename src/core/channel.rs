//! Single-use hand-off of a task's outcome from a worker to its submitter.
//!
//! [`channel`] returns a write side ([`Promise`]) and a read side
//! ([`ResultHandle`]) sharing one slot guarded by a mutex and condition
//! variable. The slot lives as long as the longer-lived of the two.
//!
//! Resolving consumes the promise, so a value can only be delivered once. A
//! promise dropped without resolving marks the slot discarded, so a waiter is
//! never left hanging on a task that will not run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use super::error::ChannelError;
use super::queue::{wait_while, WaitTimeout};

/// Slot state.
enum Slot<R> {
    Pending,
    Ready(R),
    Failed(String),
    Expired,
    Discarded,
    Consumed,
}

impl<R> Slot<R> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
            Self::Expired => "expired",
            Self::Discarded => "discarded",
            Self::Consumed => "consumed",
        }
    }
}

struct Shared<R> {
    slot: Mutex<Slot<R>>,
    settled: Condvar,
}

/// Create a connected promise/handle pair.
#[must_use]
pub fn channel<R>() -> (Promise<R>, ResultHandle<R>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        settled: Condvar::new(),
    });
    (
        Promise {
            shared: Some(Arc::clone(&shared)),
        },
        ResultHandle { shared },
    )
}

/// Write side of a result channel, held by whoever runs the task.
pub struct Promise<R> {
    shared: Option<Arc<Shared<R>>>,
}

impl<R> Promise<R> {
    /// Deliver the task's value.
    pub fn resolve(mut self, value: R) {
        self.settle(Slot::Ready(value));
    }

    /// Deliver a failure message.
    pub fn fail(mut self, message: impl Into<String>) {
        self.settle(Slot::Failed(message.into()));
    }

    /// Mark the task as expired before it ran.
    pub fn expire(mut self) {
        self.settle(Slot::Expired);
    }

    /// Whether the read side has been dropped, so nobody will see the outcome.
    pub fn is_orphaned(&self) -> bool {
        self.shared
            .as_ref()
            .map_or(true, |shared| Arc::strong_count(shared) == 1)
    }

    fn settle(&mut self, outcome: Slot<R>) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        let mut slot = shared.slot.lock();
        debug_assert!(matches!(*slot, Slot::Pending), "promise settled twice");
        *slot = outcome;
        drop(slot);
        shared.settled.notify_all();
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        self.settle(Slot::Discarded);
    }
}

impl<R> fmt::Debug for Promise<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.shared.is_none())
            .finish()
    }
}

/// Read side of a result channel, returned to the submitter.
pub struct ResultHandle<R> {
    shared: Arc<Shared<R>>,
}

impl<R> ResultHandle<R> {
    /// Block until the outcome arrives or `timeout` runs out.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Timeout`] if nothing arrived in time; the handle can
    ///   be waited on again.
    /// - [`ChannelError::Expired`], [`ChannelError::Failed`] or
    ///   [`ChannelError::Discarded`] if the task produced no value.
    /// - [`ChannelError::Consumed`] if an earlier call already took the
    ///   outcome. Debug builds panic instead.
    pub fn wait(&self, timeout: WaitTimeout) -> Result<R, ChannelError> {
        let mut slot = self.shared.slot.lock();
        wait_while(&self.shared.settled, &mut slot, timeout, |slot| {
            matches!(slot, Slot::Pending)
        });
        Self::take(&mut *slot)
    }

    /// Shorthand for [`wait`](Self::wait) with a bounded duration.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait).
    pub fn wait_for(&self, timeout: Duration) -> Result<R, ChannelError> {
        self.wait(WaitTimeout::Within(timeout))
    }

    /// Take the outcome if it has arrived, without blocking.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait); `Timeout` means still pending.
    pub fn try_get(&self) -> Result<R, ChannelError> {
        self.wait(WaitTimeout::Immediate)
    }

    /// Whether an outcome is waiting to be taken.
    pub fn is_ready(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Pending | Slot::Consumed)
    }

    fn take(slot: &mut Slot<R>) -> Result<R, ChannelError> {
        match std::mem::replace(slot, Slot::Consumed) {
            Slot::Pending => {
                *slot = Slot::Pending;
                Err(ChannelError::Timeout)
            }
            Slot::Ready(value) => Ok(value),
            Slot::Failed(message) => Err(ChannelError::Failed(message)),
            Slot::Expired => Err(ChannelError::Expired),
            Slot::Discarded => Err(ChannelError::Discarded),
            Slot::Consumed => {
                warn!("result handle waited on after its outcome was taken");
                if cfg!(debug_assertions) {
                    panic!("result handle waited on after its outcome was taken");
                }
                Err(ChannelError::Consumed)
            }
        }
    }
}

#[cfg(feature = "tokio-runtime")]
impl<R: Send + 'static> ResultHandle<R> {
    /// Wait for the outcome from async code without stalling the runtime.
    ///
    /// The condvar wait runs on tokio's blocking pool and is itself bounded by
    /// `timeout`, so no blocking thread outlives the call by more than that.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait).
    pub async fn wait_async(self, timeout: Duration) -> Result<R, ChannelError> {
        tokio::task::spawn_blocking(move || self.wait(WaitTimeout::from(timeout)))
            .await
            .unwrap_or_else(|e| Err(ChannelError::Failed(e.to_string())))
    }
}

impl<R> fmt::Debug for ResultHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("state", &self.shared.slot.lock().name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_then_wait() {
        let (promise, handle) = channel();
        promise.resolve(42);
        assert!(handle.is_ready());
        assert_eq!(handle.wait(WaitTimeout::Forever), Ok(42));
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_wait_across_threads() {
        let (promise, handle) = channel();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.resolve("done".to_string());
        });
        assert_eq!(handle.wait(WaitTimeout::Forever).as_deref(), Ok("done"));
        worker.join().unwrap();
    }

    #[test]
    fn test_timeout_is_retryable() {
        let (promise, handle) = channel::<u8>();
        assert_eq!(handle.try_get(), Err(ChannelError::Timeout));
        assert_eq!(handle.wait_for(Duration::from_millis(10)), Err(ChannelError::Timeout));
        promise.resolve(1);
        assert_eq!(handle.try_get(), Ok(1));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "outcome was taken"))]
    fn test_second_wait_is_misuse() {
        let (promise, handle) = channel();
        promise.resolve(());
        assert_eq!(handle.try_get(), Ok(()));
        assert_eq!(handle.try_get(), Err(ChannelError::Consumed));
    }

    #[test]
    fn test_expired_and_failed_outcomes() {
        let (promise, handle) = channel::<i32>();
        promise.expire();
        assert_eq!(handle.try_get(), Err(ChannelError::Expired));
        assert!(!handle.is_ready());

        let (promise, handle) = channel::<i32>();
        promise.fail("boom");
        assert_eq!(handle.try_get(), Err(ChannelError::Failed("boom".into())));
    }

    #[test]
    fn test_dropped_promise_discards() {
        let (promise, handle) = channel::<i32>();
        drop(promise);
        assert_eq!(handle.wait(WaitTimeout::Forever), Err(ChannelError::Discarded));
    }

    #[test]
    fn test_orphaned_promise() {
        let (promise, handle) = channel::<i32>();
        assert!(!promise.is_orphaned());
        drop(handle);
        assert!(promise.is_orphaned());
        promise.resolve(5);
    }

    #[test]
    fn test_debug_shows_state() {
        let (promise, handle) = channel::<i32>();
        assert_eq!(format!("{handle:?}"), "ResultHandle { state: \"pending\" }");
        promise.expire();
        assert_eq!(format!("{handle:?}"), "ResultHandle { state: \"expired\" }");
    }
}
