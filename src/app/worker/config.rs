//! Worker pool configuration

use std::time::Duration;

use crate::app::queue::RetryPolicy;
use crate::constants::{limits, workers};
use crate::errors::ConfigError;

/// Configuration for the job executors
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Number of concurrent executors
    pub worker_count: usize,
    /// Deadline for each remote call made by a job
    pub fetch_timeout: Duration,
    /// Retry budget for transient failures
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            fetch_timeout: Duration::from_secs(limits::FETCH_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(workers::MIN_WORKER_COUNT..=workers::MAX_WORKER_COUNT).contains(&self.worker_count) {
            return Err(ConfigError::InvalidValue {
                field: "worker_count".to_string(),
                value: self.worker_count.to_string(),
                reason: format!(
                    "must be between {} and {}",
                    workers::MIN_WORKER_COUNT,
                    workers::MAX_WORKER_COUNT
                ),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: "0s".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.retry.validate()
    }
}
