//! Queue, result channel, task and worker pool.

pub mod channel;
pub mod error;
pub mod queue;
pub mod task;
pub mod worker_pool;

pub use channel::{channel, Promise, ResultHandle};
pub use error::{AppResult, ChannelError, PoolError, PushError};
pub use queue::{BoundedBlockingQueue, WaitTimeout, DEFAULT_CAPACITY};
pub use task::{Task, TaskOutcome};
pub use worker_pool::{PoolStats, WorkerPool};
