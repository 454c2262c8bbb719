//! Job queue for a Sync Run
//!
//! Holds the `(Material, Attachment)` jobs enumerated when a run starts.
//! Workers pull jobs with [`JobQueue::next`]; a job that fails transiently is
//! handed back with [`JobQueue::retry`] and becomes ready again after its
//! backoff delay. The queue is drained once nothing is pending, nothing is
//! waiting out a backoff and no worker still holds a job that could come back.
//!
//! # Module Organization
//!
//! - [`types`] - `Job` and the per-job state machine
//! - [`backoff`] - retry policy and delay calculation

pub mod backoff;
pub mod types;

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::app::signals::CancelSignal;

pub use backoff::{BackoffCalculator, RetryPolicy};
pub use types::{Job, JobState};

/// Result of a single poll of the queue
#[derive(Debug)]
pub enum Dequeued {
    Job(Job),
    /// Nothing ready; poll again after the delay, or when woken if `None`
    Wait(Option<Duration>),
    Drained,
}

/// What happened to a job handed back after a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeued { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    delayed: Vec<(Instant, Job)>,
    in_flight: usize,
    closed: bool,
}

impl QueueState {
    fn promote_ready(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, job) = self.delayed.swap_remove(i);
                self.pending.push_back(job);
            } else {
                i += 1;
            }
        }
    }

    fn next_ready_in(&self, now: Instant) -> Option<Duration> {
        self.delayed
            .iter()
            .map(|(ready_at, _)| ready_at.saturating_duration_since(now))
            .min()
    }
}

/// Shared queue of jobs for one Sync Run
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    policy: RetryPolicy,
}

impl JobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            policy,
        }
    }

    /// Create a queue preloaded with jobs
    pub fn with_jobs(policy: RetryPolicy, jobs: impl IntoIterator<Item = Job>) -> Self {
        let mut queue = Self::new(policy);
        queue.state.get_mut().pending.extend(jobs);
        queue
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn push(&self, job: Job) {
        self.state.lock().await.pending.push_back(job);
        self.notify.notify_waiters();
    }

    /// Jobs not yet finished, including those held by workers
    pub async fn outstanding(&self) -> usize {
        let state = self.state.lock().await;
        state.pending.len() + state.delayed.len() + state.in_flight
    }

    /// Poll once without waiting
    pub async fn dequeue(&self) -> Dequeued {
        let mut state = self.state.lock().await;
        if state.closed {
            return Dequeued::Drained;
        }

        let now = Instant::now();
        state.promote_ready(now);

        if let Some(job) = state.pending.pop_front() {
            state.in_flight += 1;
            return Dequeued::Job(job);
        }
        if let Some(delay) = state.next_ready_in(now) {
            return Dequeued::Wait(Some(delay));
        }
        if state.in_flight > 0 {
            return Dequeued::Wait(None);
        }
        Dequeued::Drained
    }

    /// Wait for the next ready job
    ///
    /// Returns `None` once the queue is drained or `cancel` fires; no job is
    /// handed out after cancellation has been observed.
    pub async fn next(&self, cancel: &CancelSignal) -> Option<Job> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.dequeue().await {
                Dequeued::Job(job) => return Some(job),
                Dequeued::Drained => return None,
                Dequeued::Wait(Some(delay)) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = notified => {}
                        _ = cancel.cancelled() => return None,
                    }
                }
                Dequeued::Wait(None) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = cancel.cancelled() => return None,
                    }
                }
            }
        }
    }

    /// Mark a dequeued job as finished (recorded or terminally failed)
    pub async fn finish(&self, job: &Job) {
        {
            let mut state = self.state.lock().await;
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        debug!("Job {} finished as {}", job.id, job.state());
        self.notify.notify_waiters();
    }

    /// Hand back a job that failed transiently
    ///
    /// Requeues it behind its backoff delay while the attempt budget allows,
    /// otherwise reports exhaustion and the caller fails the job terminally.
    pub async fn retry(&self, mut job: Job) -> (RetryDecision, Option<Job>) {
        let attempts = job.attempt;
        if !self.policy.allows_retry(attempts) {
            self.finish(&job).await;
            return (RetryDecision::Exhausted { attempts }, Some(job));
        }

        let delay = self.policy.delay_after(attempts);
        job.advance(JobState::Pending);
        {
            let mut state = self.state.lock().await;
            state.in_flight = state.in_flight.saturating_sub(1);
            state.delayed.push((Instant::now() + delay, job));
        }
        self.notify.notify_waiters();

        (
            RetryDecision::Requeued {
                attempt: attempts + 1,
                delay,
            },
            None,
        )
    }

    /// Stop handing out jobs; pending jobs are abandoned
    pub async fn close(&self) -> usize {
        let abandoned = {
            let mut state = self.state.lock().await;
            state.closed = true;
            let abandoned = state.pending.len() + state.delayed.len();
            state.pending.clear();
            state.delayed.clear();
            abandoned
        };
        self.notify.notify_waiters();
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Attachment, Material, MaterialKind};
    use std::sync::Arc;

    fn job(id: u64) -> Job {
        let material = Material::new(format!("m{}", id), "Week", MaterialKind::CourseMaterial);
        Job::new(
            id,
            Arc::new(material),
            Attachment::drive(format!("f{}", id), "Handout", "application/pdf"),
            Some("Biology".to_string()),
        )
    }

    fn run_attempt(job: &mut Job) {
        job.advance(JobState::Resolving);
        job.advance(JobState::Fetching);
    }

    #[tokio::test]
    async fn test_fifo_and_drain() {
        let queue = JobQueue::with_jobs(RetryPolicy::immediate(3), vec![job(1), job(2)]);
        let cancel = CancelSignal::new();

        let first = queue.next(&cancel).await.unwrap();
        let second = queue.next(&cancel).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(matches!(queue.dequeue().await, Dequeued::Wait(None)));

        queue.finish(&first).await;
        queue.finish(&second).await;
        assert!(matches!(queue.dequeue().await, Dequeued::Drained));
        assert!(queue.next(&cancel).await.is_none());
    }

    /// Test transient retry budget
    ///
    /// A job can be handed back until its attempt budget is spent, then the
    /// queue reports exhaustion instead of requeueing it.
    #[tokio::test]
    async fn test_retry_until_exhausted() {
        let queue = JobQueue::with_jobs(RetryPolicy::immediate(3), vec![job(1)]);
        let cancel = CancelSignal::new();

        for expected_attempt in 2..=3 {
            let mut j = queue.next(&cancel).await.unwrap();
            run_attempt(&mut j);
            let (decision, returned) = queue.retry(j).await;
            assert!(returned.is_none());
            assert_eq!(
                decision,
                RetryDecision::Requeued {
                    attempt: expected_attempt,
                    delay: Duration::ZERO
                }
            );
        }

        let mut j = queue.next(&cancel).await.unwrap();
        run_attempt(&mut j);
        assert_eq!(j.attempt, 3);
        let (decision, returned) = queue.retry(j).await;
        assert_eq!(decision, RetryDecision::Exhausted { attempts: 3 });
        assert!(returned.is_some());
        assert_eq!(queue.outstanding().await, 0);
    }

    #[tokio::test]
    async fn test_waits_for_backoff() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            multiplier: 1.0,
            jitter_factor: 0.0,
        };
        let queue = JobQueue::with_jobs(policy, vec![job(1)]);
        let cancel = CancelSignal::new();

        let mut j = queue.next(&cancel).await.unwrap();
        run_attempt(&mut j);
        queue.retry(j).await;
        assert!(matches!(queue.dequeue().await, Dequeued::Wait(Some(_))));

        let started = Instant::now();
        let again = queue.next(&cancel).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(again.state(), JobState::Pending);
    }

    /// Test worker wake-up on requeue
    ///
    /// A worker idling on an empty queue resumes when another worker hands a
    /// job back.
    #[tokio::test]
    async fn test_idle_worker_woken_by_retry() {
        let queue = Arc::new(JobQueue::with_jobs(RetryPolicy::immediate(2), vec![job(7)]));
        let cancel = CancelSignal::new();

        let mut held = queue.next(&cancel).await.unwrap();
        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await.map(|j| j.id) })
        };

        tokio::task::yield_now().await;
        run_attempt(&mut held);
        queue.retry(held).await;

        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_cancel_and_close() {
        let queue = JobQueue::with_jobs(RetryPolicy::immediate(1), vec![job(1), job(2)]);
        let cancel = CancelSignal::new();
        cancel.cancel();
        assert!(queue.next(&cancel).await.is_none());

        assert_eq!(queue.close().await, 2);
        assert!(matches!(queue.dequeue().await, Dequeued::Drained));
    }
}
