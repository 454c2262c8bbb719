//! Bounded pool of job executors
//!
//! Workers pull `(Material, Attachment)` jobs from the run's [`JobQueue`] and
//! run each through resolve, fetch, dedup, placement and recording. Workers
//! never wait on one another except at the two serialization points: the
//! shared rate gate and the per-digest cell of the dedup index.
//!
//! # Module Organization
//!
//! - [`config`] - pool size, per-call timeout and retry budget
//! - [`core`] - the per-job pipeline
//! - [`pool`] - spawning and joining workers
//!
//! [`JobQueue`]: crate::app::queue::JobQueue

pub mod config;
pub mod core;
pub mod pool;

pub use config::WorkerConfig;
pub use self::core::{SyncWorker, WorkerContext, WorkerReport};
pub use pool::WorkerPool;
