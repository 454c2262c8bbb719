//! Job and per-job state machine

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::app::models::{Attachment, Material};

/// Position of a job in the download pipeline
///
/// Causal order per job is `Pending → Resolving → Fetching → Deduping →
/// (Placing →) Recorded`. Any active state may fall to `Failed`; a transient
/// failure sends the job back to `Pending` instead while attempts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Resolving,
    Fetching,
    Deduping,
    Placing,
    Recorded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Recorded | JobState::Failed)
    }

    /// Whether the pipeline permits moving from `self` to `next`
    pub fn can_advance_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Resolving) => true,
            (Resolving, Fetching) => true,
            (Fetching, Deduping) => true,
            (Deduping, Placing) | (Deduping, Recorded) => true,
            (Placing, Recorded) => true,
            // Transient failures before anything was written go back to the queue
            (Resolving, Pending) | (Fetching, Pending) => true,
            (state, Failed) => !state.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Resolving => "resolving",
            JobState::Fetching => "fetching",
            JobState::Deduping => "deduping",
            JobState::Placing => "placing",
            JobState::Recorded => "recorded",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One Material × Attachment unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub material: Arc<Material>,
    pub attachment: Attachment,
    /// Display name of the owning course; `None` files under Uncategorized
    pub course_name: Option<String>,
    /// Attempts started so far, including the current one
    pub attempt: u32,
    state: JobState,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(
        id: u64,
        material: Arc<Material>,
        attachment: Attachment,
        course_name: Option<String>,
    ) -> Self {
        Self {
            id,
            material,
            attachment,
            course_name,
            attempt: 0,
            state: JobState::Pending,
            last_error: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`, returning false (and staying put) if the move is illegal
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                "Job {} rejected transition {} -> {}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        self.state = next;
        if next == JobState::Resolving {
            self.attempt += 1;
        }
        true
    }

    /// Human readable label used in progress and error output
    pub fn label(&self) -> String {
        format!("{} / {}", self.material.title, self.attachment.display_name())
    }

    pub fn display_name(&self) -> &str {
        self.attachment.display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::MaterialKind;

    fn job() -> Job {
        let material = Material::new("m1", "Week 1", MaterialKind::Assignment);
        Job::new(1, Arc::new(material), Attachment::link("https://x.test", None), None)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        for next in [
            JobState::Resolving,
            JobState::Fetching,
            JobState::Deduping,
            JobState::Placing,
            JobState::Recorded,
        ] {
            assert!(job.advance(next), "failed to enter {}", next);
        }
        assert!(job.state().is_terminal());
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut job = job();
        assert!(!job.advance(JobState::Fetching));
        assert_eq!(job.state(), JobState::Pending);

        job.advance(JobState::Resolving);
        job.advance(JobState::Failed);
        assert!(!job.advance(JobState::Pending));
        assert!(!job.advance(JobState::Failed));
    }

    /// Test retry loop counts attempts
    ///
    /// Re-entering `Pending` after a transient failure and resolving again
    /// bumps the attempt counter carried in the job.
    #[test]
    fn test_retry_increments_attempt() {
        let mut job = job();
        job.advance(JobState::Resolving);
        job.advance(JobState::Fetching);
        assert!(job.advance(JobState::Pending));
        job.advance(JobState::Resolving);
        assert_eq!(job.attempt, 2);
        assert!(!JobState::Placing.can_advance_to(JobState::Pending));
    }
}
