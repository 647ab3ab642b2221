//! Bounded, blocking, multi-producer/multi-consumer queue.
//!
//! Storage is a `VecDeque` behind a `parking_lot::Mutex`. Two condition
//! variables park consumers waiting for items and producers waiting for
//! space. The occupancy counter is mirrored into an atomic so `len()` and
//! `is_empty()` never take the lock.
//!
//! Admission is always decided under the lock: a non-blocking push at exactly
//! full capacity fails fast and hands the item back, leaving the retry policy
//! to the caller.
//!
//! # Examples
//!
//! ```
//! use taskyard::core::{BoundedBlockingQueue, WaitTimeout};
//!
//! let queue = BoundedBlockingQueue::new(2);
//! queue.push(1).unwrap();
//! queue.push(2).unwrap();
//! assert!(queue.push(3).is_err());
//!
//! assert_eq!(queue.pop(WaitTimeout::Immediate), Some(1));
//! assert_eq!(queue.pop(WaitTimeout::Immediate), Some(2));
//! assert_eq!(queue.pop(WaitTimeout::Immediate), None);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::error::PushError;

/// Capacity used when none is given.
pub const DEFAULT_CAPACITY: usize = 0x7FFF;

/// How long a blocking operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitTimeout {
    /// Wait until the condition holds, however long that takes.
    Forever,
    /// Do not wait at all.
    Immediate,
    /// Wait at most this long.
    Within(Duration),
}

impl WaitTimeout {
    /// Map a signed millisecond count: negative waits forever, zero does not
    /// wait, positive waits up to that many milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            Self::Forever
        } else if millis == 0 {
            Self::Immediate
        } else {
            Self::Within(Duration::from_millis(millis.unsigned_abs()))
        }
    }

    /// Whether this timeout never blocks.
    #[must_use]
    pub const fn is_immediate(self) -> bool {
        matches!(self, Self::Immediate)
    }
}

impl From<Duration> for WaitTimeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::Immediate
        } else {
            Self::Within(duration)
        }
    }
}

impl From<Option<Duration>> for WaitTimeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::Forever, Self::from)
    }
}

/// Park on `cond` while `blocked` holds, for at most `timeout`.
pub(crate) fn wait_while<T, F>(cond: &Condvar, guard: &mut MutexGuard<'_, T>, timeout: WaitTimeout, blocked: F)
where
    F: FnMut(&mut T) -> bool,
{
    match timeout {
        WaitTimeout::Forever => cond.wait_while(guard, blocked),
        WaitTimeout::Immediate => {}
        WaitTimeout::Within(bound) => {
            cond.wait_while_for(guard, blocked, bound);
        }
    }
}

/// Fixed-capacity FIFO queue with blocking and timed operations.
///
/// Front and back are both reachable, so the same queue also serves LIFO use
/// through [`push_front`](Self::push_front) or [`pop_back`](Self::pop_back).
pub struct BoundedBlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    len: AtomicUsize,
    capacity: AtomicUsize,
}

impl<T> BoundedBlockingQueue<T> {
    /// Create an empty queue admitting at most `capacity` items.
    ///
    /// A zero capacity is bumped to one so the queue can make progress.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            len: AtomicUsize::new(0),
            capacity: AtomicUsize::new(capacity.max(1)),
        }
    }

    /// Create an empty queue with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Number of queued items. Lock-free; may trail a concurrent push or pop.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Alias of [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Whether the queue holds no items. Lock-free.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Replace the capacity and return the previous one. Zero leaves the
    /// capacity untouched and returns the current value.
    ///
    /// Shrinking below the current occupancy evicts nothing; pushes fail
    /// until consumers drain below the new bound.
    pub fn set_capacity(&self, capacity: usize) -> usize {
        if capacity == 0 {
            return self.capacity();
        }
        let _items = self.items.lock();
        let previous = self.capacity.swap(capacity, Ordering::AcqRel);
        if capacity > previous {
            self.not_full.notify_all();
        }
        previous
    }

    /// Append to the back if there is room, otherwise hand the item back.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] if the queue is at capacity.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        self.push_with(item, WaitTimeout::Immediate, VecDeque::push_back)
    }

    /// Alias of [`push`](Self::push).
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] if the queue is at capacity.
    pub fn push_back(&self, item: T) -> Result<(), PushError<T>> {
        self.push(item)
    }

    /// Insert at the front if there is room, so it is the next item popped.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] if the queue is at capacity.
    pub fn push_front(&self, item: T) -> Result<(), PushError<T>> {
        self.push_with(item, WaitTimeout::Immediate, VecDeque::push_front)
    }

    /// Append to the back, waiting up to `timeout` for room.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] for [`WaitTimeout::Immediate`] on a full
    /// queue, or [`PushError::Timeout`] if the wait ran out.
    pub fn push_timeout(&self, item: T, timeout: WaitTimeout) -> Result<(), PushError<T>> {
        self.push_with(item, timeout, VecDeque::push_back)
    }

    fn push_with(
        &self,
        item: T,
        timeout: WaitTimeout,
        place: fn(&mut VecDeque<T>, T),
    ) -> Result<(), PushError<T>> {
        let mut items = self.items.lock();
        let capacity = &self.capacity;
        wait_while(&self.not_full, &mut items, timeout, |items| {
            items.len() >= capacity.load(Ordering::Acquire)
        });

        if items.len() >= self.capacity.load(Ordering::Acquire) {
            return Err(if timeout.is_immediate() {
                PushError::Full(item)
            } else {
                PushError::Timeout(item)
            });
        }

        place(&mut *items, item);
        self.len.store(items.len(), Ordering::Release);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the front item, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: WaitTimeout) -> Option<T> {
        self.pop_with(timeout, VecDeque::pop_front)
    }

    /// Alias of [`pop`](Self::pop).
    pub fn pop_front(&self, timeout: WaitTimeout) -> Option<T> {
        self.pop(timeout)
    }

    /// Take the back item (the most recently pushed), waiting up to `timeout`.
    pub fn pop_back(&self, timeout: WaitTimeout) -> Option<T> {
        self.pop_with(timeout, VecDeque::pop_back)
    }

    fn pop_with(&self, timeout: WaitTimeout, take: fn(&mut VecDeque<T>) -> Option<T>) -> Option<T> {
        let mut items = self.items.lock();
        wait_while(&self.not_empty, &mut items, timeout, |items| items.is_empty());

        let item = take(&mut *items)?;
        self.len.store(items.len(), Ordering::Release);
        drop(items);
        self.not_full.notify_one();
        Some(item)
    }

    /// Remove every item and return how many there were.
    ///
    /// The removed items are dropped after the lock is released. Consumers
    /// blocked in `pop` keep waiting.
    pub fn clear(&self) -> usize {
        let removed = self.take_all();
        let count = removed.len();
        drop(removed);
        count
    }

    /// Remove every item and return them in queue order.
    pub fn drain(&self) -> Vec<T> {
        self.take_all().into()
    }

    fn take_all(&self) -> VecDeque<T> {
        let mut items = self.items.lock();
        let removed = std::mem::take(&mut *items);
        self.len.store(0, Ordering::Release);
        drop(items);
        self.not_full.notify_all();
        removed
    }

    /// Exchange the queue's storage with `other`.
    ///
    /// Occupancy becomes `other`'s former length, even if that exceeds the
    /// capacity.
    pub fn swap(&self, other: &mut VecDeque<T>) {
        let mut items = self.items.lock();
        std::mem::swap(&mut *items, other);
        self.len.store(items.len(), Ordering::Release);
        drop(items);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl<T> Default for BoundedBlockingQueue<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<T> std::fmt::Debug for BoundedBlockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBlockingQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
