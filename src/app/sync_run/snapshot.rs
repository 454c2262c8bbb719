//! Read-side views of a Sync Run

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::store::SyncRunArchive;

/// Lifecycle of a Sync Run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Listing courses and materials; total not yet known
    Enumerating,
    Running,
    Completed,
    Cancelled,
    /// Listing failed before any job was enumerated
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Enumerating => "enumerating",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Recorded,
    Skipped,
    Retrying,
    Failed,
    Finished,
}

/// One entry of the rolling event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub message: String,
}

/// A terminal job failure kept for user display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunErrorEntry {
    pub material_id: String,
    pub material_title: String,
    pub attachment: String,
    /// `remote`, `unsupported` or `internal`
    pub origin: String,
    pub message: String,
}

impl fmt::Display for RunErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}: {} [{}]",
            self.material_title, self.attachment, self.message, self.origin
        )
    }
}

/// Consistent point-in-time view of progress, safe to poll during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub session_id: Option<String>,
    pub status: Option<RunStatus>,
    pub is_active: bool,
    pub is_complete: bool,
    pub total_files: u64,
    pub completed_files: u64,
    pub failed_files: u64,
    pub duplicates_skipped: u64,
    pub retries: u64,
    pub current_file_name: Option<String>,
    /// Most recent terminal failures, oldest first
    pub errors: Vec<String>,
    pub overall_progress_percent: f64,
    pub recent_events: Vec<SyncEvent>,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Snapshot reported when no run has been started
    pub fn idle() -> Self {
        Self {
            session_id: None,
            status: None,
            is_active: false,
            is_complete: false,
            total_files: 0,
            completed_files: 0,
            failed_files: 0,
            duplicates_skipped: 0,
            retries: 0,
            current_file_name: None,
            errors: Vec::new(),
            overall_progress_percent: 0.0,
            recent_events: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Jobs that reached a terminal outcome
    pub fn processed(&self) -> u64 {
        self.completed_files + self.failed_files + self.duplicates_skipped
    }
}

/// Final outcome of a Sync Run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
    pub session_id: String,
    pub status: RunStatus,
    pub course_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries: u64,
    /// Bytes of new files written; deduplicated payloads are not counted
    pub bytes_written: u64,
    pub errors: Vec<RunErrorEntry>,
}

impl SyncSummary {
    /// Jobs never finished because the run stopped early
    pub fn abandoned(&self) -> u64 {
        self.total
            .saturating_sub(self.completed + self.failed + self.skipped)
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl From<&SyncSummary> for SyncRunArchive {
    fn from(summary: &SyncSummary) -> Self {
        SyncRunArchive {
            session_id: summary.session_id.clone(),
            started_at: summary.started_at,
            finished_at: summary.finished_at,
            status: summary.status.as_str().to_string(),
            course_ids: summary.course_ids.clone(),
            total: summary.total,
            completed: summary.completed,
            failed: summary.failed,
            skipped: summary.skipped,
            errors: summary.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}
