//! Configuration models for worker pools.

pub mod pool;

pub use pool::{resolve_worker_count, AdmissionPolicy, WorkerPoolConfig, ENV_PREFIX};
