//! # Taskyard
//!
//! A bounded blocking task queue and a fixed-size worker thread pool.
//!
//! Producers submit closures; dedicated OS threads pull them from a bounded
//! FIFO queue and run them. Each submission returns a [`ResultHandle`] the
//! submitter can block on for the closure's return value.
//!
//! ## Key Features
//!
//! - **Bounded MPMC queue**: [`BoundedBlockingQueue`] with blocking, timed and
//!   non-blocking push/pop at either end
//! - **Backpressure**: a full queue blocks, rejects or times out the submitter
//!   according to the configured [`AdmissionPolicy`]
//! - **Deadlines**: a task whose deadline passed while queued is dropped unrun
//!   and its handle resolves as expired
//! - **Panic isolation**: a panicking task is reported through the pool's
//!   [`ErrorReporter`](util::ErrorReporter) and the worker keeps going
//! - **Quiescence**: `wait` blocks until nothing is queued or running
//! - **Injectable clock**: deadlines are read from a [`Clock`](util::Clock), so
//!   tests can drive time by hand
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use taskyard::{WaitTimeout, WorkerPool};
//!
//! let pool = WorkerPool::builder().worker_count(4).build_started()?;
//!
//! let handles: Vec<_> = (0..8u64)
//!     .map(|i| pool.submit(move || i * i))
//!     .collect::<Result<_, _>>()?;
//!
//! let ttl = pool.submit_with_ttl(|| "fresh", Duration::from_secs(30))?;
//!
//! assert!(pool.wait(WaitTimeout::Forever));
//! let squares: Vec<u64> = handles
//!     .iter()
//!     .map(|h| h.wait(WaitTimeout::Immediate))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(squares[7], 49);
//! assert_eq!(ttl.try_get()?, "fresh");
//!
//! pool.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! With the `tokio-runtime` feature (on by default), a handle can also be
//! awaited from async code with `ResultHandle::wait_async`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Queue, result channel, task and worker pool.
pub mod core;
/// Configuration models for worker pools.
pub mod config;
/// Builders to construct worker pools from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;

pub use builders::WorkerPoolBuilder;
pub use config::{AdmissionPolicy, WorkerPoolConfig};
pub use crate::core::{
    channel, BoundedBlockingQueue, ChannelError, PoolError, PoolStats, Promise, PushError,
    ResultHandle, Task, TaskOutcome, WaitTimeout, WorkerPool,
};
