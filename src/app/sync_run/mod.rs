//! Sync Run aggregate and progress tracking
//!
//! A [`SyncRun`] is the owned, in-memory state of one orchestration
//! invocation. Workers hold it by `Arc` and report job outcomes; every update
//! takes the single write lock, so a [`ProgressSnapshot`] never observes a
//! half-applied update. [`SyncTracker`] keeps at most one live run and serves
//! snapshots of whichever run is current.
//!
//! # Module Organization
//!
//! - [`snapshot`] - status, events, snapshots and summaries

pub mod snapshot;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::app::models::DateRange;
use crate::constants::progress;
use crate::errors::{SyncError, SyncResult};

pub use snapshot::{
    EventKind, ProgressSnapshot, RunErrorEntry, RunStatus, SyncEvent, SyncSummary,
};

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    total: u64,
    completed: u64,
    failed: u64,
    skipped: u64,
    retries: u64,
    bytes_written: u64,
    current_file: Option<String>,
    errors: Vec<RunErrorEntry>,
    events: VecDeque<SyncEvent>,
    finished_at: Option<DateTime<Utc>>,
}

/// Live state of one Sync Run
#[derive(Debug)]
pub struct SyncRun {
    session_id: String,
    course_ids: Vec<String>,
    range: DateRange,
    started_at: DateTime<Utc>,
    started: Instant,
    event_capacity: usize,
    errors_shown: usize,
    state: RwLock<RunState>,
}

impl SyncRun {
    pub fn new(session_id: impl Into<String>, course_ids: Vec<String>, range: DateRange) -> Self {
        Self::with_limits(
            session_id,
            course_ids,
            range,
            progress::EVENT_LOG_CAPACITY,
            progress::ERRORS_SHOWN,
        )
    }

    pub fn with_limits(
        session_id: impl Into<String>,
        course_ids: Vec<String>,
        range: DateRange,
        event_capacity: usize,
        errors_shown: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            course_ids,
            range,
            started_at: Utc::now(),
            started: Instant::now(),
            event_capacity: event_capacity.max(1),
            errors_shown,
            state: RwLock::new(RunState {
                status: RunStatus::Enumerating,
                total: 0,
                completed: 0,
                failed: 0,
                skipped: 0,
                retries: 0,
                bytes_written: 0,
                current_file: None,
                errors: Vec::new(),
                events: VecDeque::new(),
                finished_at: None,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn course_ids(&self) -> &[String] {
        &self.course_ids
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub async fn status(&self) -> RunStatus {
        self.state.read().await.status
    }

    fn push_event(&self, state: &mut RunState, kind: EventKind, message: String) {
        if state.events.len() == self.event_capacity {
            state.events.pop_front();
        }
        state.events.push_back(SyncEvent {
            at: Utc::now(),
            kind,
            message,
        });
    }

    /// Fix the candidate total and start counting
    ///
    /// Only the first call has an effect; later enumeration never grows a run.
    pub async fn begin(&self, total: u64) {
        let mut state = self.state.write().await;
        if state.status != RunStatus::Enumerating {
            return;
        }
        state.status = RunStatus::Running;
        state.total = total;
        self.push_event(
            &mut state,
            EventKind::Started,
            format!("Sync started with {} files", total),
        );
        info!("Sync run {} started with {} jobs", self.session_id, total);
    }

    pub async fn job_started(&self, name: &str) {
        let mut state = self.state.write().await;
        state.current_file = Some(name.to_string());
    }

    /// A job wrote new bytes and was recorded
    pub async fn job_recorded(&self, name: &str, bytes: u64) {
        let mut state = self.state.write().await;
        state.completed += 1;
        state.bytes_written += bytes;
        self.push_event(&mut state, EventKind::Recorded, format!("Downloaded {}", name));
    }

    /// A job's content was already stored; recorded against the canonical file
    pub async fn job_skipped(&self, name: &str) {
        let mut state = self.state.write().await;
        state.skipped += 1;
        self.push_event(
            &mut state,
            EventKind::Skipped,
            format!("Duplicate content, reused existing file for {}", name),
        );
    }

    pub async fn job_retrying(&self, name: &str, attempt: u32, reason: &str) {
        let mut state = self.state.write().await;
        state.retries += 1;
        self.push_event(
            &mut state,
            EventKind::Retrying,
            format!("Retrying {} (attempt {}): {}", name, attempt, reason),
        );
    }

    pub async fn job_failed(&self, entry: RunErrorEntry) {
        let mut state = self.state.write().await;
        state.failed += 1;
        self.push_event(&mut state, EventKind::Failed, format!("Failed {}", entry));
        state.errors.push(entry);
    }

    /// Move to a terminal status; the first terminal status wins
    pub async fn finish(&self, status: RunStatus) {
        let mut state = self.state.write().await;
        if state.status.is_terminal() {
            return;
        }
        state.status = status;
        state.current_file = None;
        state.finished_at = Some(Utc::now());
        let message = format!(
            "Sync {}: {} downloaded, {} duplicates, {} failed",
            status, state.completed, state.skipped, state.failed
        );
        self.push_event(&mut state, EventKind::Finished, message);
        debug!("Sync run {} finished as {}", self.session_id, status);
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.read().await;
        let processed = state.completed + state.failed + state.skipped;
        let overall_progress_percent = if state.total > 0 {
            (processed as f64 / state.total as f64 * 100.0).min(100.0)
        } else if state.status == RunStatus::Completed {
            100.0
        } else {
            0.0
        };
        let skip = state.errors.len().saturating_sub(self.errors_shown);

        ProgressSnapshot {
            session_id: Some(self.session_id.clone()),
            status: Some(state.status),
            is_active: !state.status.is_terminal(),
            is_complete: state.status.is_terminal(),
            total_files: state.total,
            completed_files: state.completed,
            failed_files: state.failed,
            duplicates_skipped: state.skipped,
            retries: state.retries,
            current_file_name: state.current_file.clone(),
            errors: state.errors.iter().skip(skip).map(|e| e.to_string()).collect(),
            overall_progress_percent,
            recent_events: state.events.iter().cloned().collect(),
            elapsed: self.started.elapsed(),
        }
    }

    pub async fn summary(&self) -> SyncSummary {
        let state = self.state.read().await;
        SyncSummary {
            session_id: self.session_id.clone(),
            status: state.status,
            course_ids: self.course_ids.clone(),
            started_at: self.started_at,
            finished_at: state.finished_at.unwrap_or_else(Utc::now),
            total: state.total,
            completed: state.completed,
            failed: state.failed,
            skipped: state.skipped,
            retries: state.retries,
            bytes_written: state.bytes_written,
            errors: state.errors.clone(),
        }
    }
}

/// Holds the current Sync Run; at most one is live at a time
#[derive(Debug, Default)]
pub struct SyncTracker {
    current: RwLock<Option<Arc<SyncRun>>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `run` as the current run
    ///
    /// A finished run is superseded; a live one rejects the new run.
    pub async fn start(&self, run: Arc<SyncRun>) -> SyncResult<()> {
        let mut current = self.current.write().await;
        if let Some(existing) = current.as_ref() {
            if !existing.status().await.is_terminal() {
                return Err(SyncError::AlreadyActive {
                    session_id: existing.session_id().to_string(),
                });
            }
        }
        *current = Some(run);
        Ok(())
    }

    pub async fn current(&self) -> Option<Arc<SyncRun>> {
        self.current.read().await.clone()
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        match self.current().await {
            Some(run) => run.snapshot().await,
            None => ProgressSnapshot::idle(),
        }
    }
}
