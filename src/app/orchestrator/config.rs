//! Orchestrator configuration and sync requests

use std::path::PathBuf;

use crate::app::models::DateRange;
use crate::app::worker::WorkerConfig;
use crate::constants::{progress, workers};
use crate::errors::{ConfigError, SyncError, SyncResult};

/// Runtime configuration for the download orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Root of the `{course}/{category}/{file}` tree
    pub download_root: PathBuf,
    pub worker: WorkerConfig,
    /// Capacity of each run's rolling event log
    pub event_log_capacity: usize,
    /// Errors exposed in progress snapshots
    pub errors_shown: usize,
}

impl OrchestratorConfig {
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            worker: WorkerConfig::default(),
            event_log_capacity: progress::EVENT_LOG_CAPACITY,
            errors_shown: progress::ERRORS_SHOWN,
        }
    }

    pub fn with_worker_config(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "download_root".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_log_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.worker.validate()
    }
}

/// What a Sync Run should cover
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Courses to sync; empty means every active course
    pub course_ids: Vec<String>,
    pub range: DateRange,
    /// Override of the configured pool size
    pub worker_count: Option<usize>,
}

impl SyncRequest {
    /// Every active course, no date filter
    pub fn all_active() -> Self {
        Self::default()
    }

    pub fn for_courses<I, S>(course_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            course_ids: course_ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = Some(worker_count);
        self
    }

    /// Course ids with blanks and repeats removed, first occurrence kept
    pub fn normalized_course_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.course_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
            .map(str::to_string)
            .collect()
    }

    pub fn validate(&self) -> SyncResult<()> {
        if let Some(count) = self.worker_count {
            if !(workers::MIN_WORKER_COUNT..=workers::MAX_WORKER_COUNT).contains(&count) {
                return Err(SyncError::InvalidRequest {
                    reason: format!(
                        "worker count {} outside {}..={}",
                        count,
                        workers::MIN_WORKER_COUNT,
                        workers::MAX_WORKER_COUNT
                    ),
                });
            }
        }
        if let (Some(since), Some(until)) = (self.range.since, self.range.until) {
            if since > until {
                return Err(SyncError::InvalidRequest {
                    reason: format!("start date {} is after end date {}", since, until),
                });
            }
        }
        Ok(())
    }
}
