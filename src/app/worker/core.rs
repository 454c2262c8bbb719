//! Single job executor
//!
//! A [`SyncWorker`] pulls jobs from the shared queue and drives each one
//! through the pipeline: resolve the attachment, fetch its bytes, digest them,
//! register the digest (placing the file only for first sightings) and record
//! the outcome. Cancellation is checked before every dequeue and between
//! transitions; a transition already started always finishes.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::dedup::{DedupIndex, Registration};
use crate::app::digest::ContentDigest;
use crate::app::fetcher::{ContentFetcher, FetchedContent};
use crate::app::models::{Attachment, AttachmentSource, DownloadRecord, RecordStatus};
use crate::app::placement::{file_name_for_plan, FilePlacer};
use crate::app::queue::{Job, JobQueue, JobState, RetryDecision};
use crate::app::resolver::{AttachmentResolver, FetchPlan};
use crate::app::signals::CancelSignal;
use crate::app::store::MetadataStore;
use crate::app::sync_run::{RunErrorEntry, SyncRun};
use crate::constants::mime;
use crate::errors::{FetchError, JobError};

/// Everything a worker shares with its siblings
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub run: Arc<SyncRun>,
    pub fetcher: ContentFetcher,
    pub resolver: AttachmentResolver,
    pub dedup: Arc<DedupIndex>,
    pub placer: FilePlacer,
    pub store: MetadataStore,
    pub cancel: CancelSignal,
}

/// How a job's pipeline ended
#[derive(Debug)]
enum Outcome {
    Stored { bytes: u64 },
    Deduplicated,
    /// Stopped between transitions after cancellation
    Abandoned,
}

/// Per-worker tallies, returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: u32,
    pub stored: u64,
    pub deduplicated: u64,
    pub failed: u64,
    pub retried: u64,
    pub abandoned: u64,
}

/// Individual job executor
#[derive(Debug)]
pub struct SyncWorker {
    id: u32,
    ctx: WorkerContext,
    report: WorkerReport,
}

impl SyncWorker {
    pub fn new(id: u32, ctx: WorkerContext) -> Self {
        Self {
            id,
            ctx,
            report: WorkerReport {
                worker_id: id,
                ..Default::default()
            },
        }
    }

    /// Process jobs until the queue drains or the run is cancelled
    pub async fn run(mut self) -> WorkerReport {
        debug!("Worker {} starting", self.id);

        while let Some(job) = self.ctx.queue.next(&self.ctx.cancel).await {
            self.handle(job).await;
        }

        debug!(
            "Worker {} done: {} stored, {} deduplicated, {} failed",
            self.id, self.report.stored, self.report.deduplicated, self.report.failed
        );
        self.report
    }

    async fn handle(&mut self, mut job: Job) {
        self.ctx.run.job_started(job.display_name()).await;

        match self.process(&mut job).await {
            Ok(Outcome::Stored { bytes }) => {
                self.report.stored += 1;
                self.ctx.run.job_recorded(job.display_name(), bytes).await;
                self.ctx.queue.finish(&job).await;
            }
            Ok(Outcome::Deduplicated) => {
                self.report.deduplicated += 1;
                self.ctx.run.job_skipped(job.display_name()).await;
                self.ctx.queue.finish(&job).await;
            }
            Ok(Outcome::Abandoned) => {
                self.report.abandoned += 1;
                debug!("Job {} abandoned in state {}", job.id, job.state());
                self.ctx.queue.finish(&job).await;
            }
            Err(JobError::Fetch(FetchError::Cancelled { .. })) => {
                self.report.abandoned += 1;
                debug!("Job {} cancelled while waiting for the rate gate", job.id);
                self.ctx.queue.finish(&job).await;
            }
            Err(e) if e.is_transient() && self.ctx.cancel.is_cancelled() => {
                self.report.abandoned += 1;
                debug!("Job {} abandoned after cancellation: {}", job.id, e);
                self.ctx.queue.finish(&job).await;
            }
            Err(e) if e.is_transient() => self.retry(job, e).await,
            Err(e) => self.fail(job, e).await,
        }
    }

    async fn retry(&mut self, mut job: Job, error: JobError) {
        let reason = error.to_string();
        job.last_error = Some(reason.clone());
        let name = job.display_name().to_string();

        match self.ctx.queue.retry(job).await {
            (RetryDecision::Requeued { attempt, delay }, _) => {
                self.report.retried += 1;
                warn!(
                    "Transient failure for {}, retrying in {:?} (attempt {}): {}",
                    name, delay, attempt, reason
                );
                self.ctx.run.job_retrying(&name, attempt, &reason).await;
            }
            (RetryDecision::Exhausted { attempts }, Some(job)) => {
                warn!("Giving up on {} after {} attempts", name, attempts);
                self.fail_finished(job, error).await;
            }
            (RetryDecision::Exhausted { .. }, None) => {}
        }
    }

    async fn fail(&mut self, job: Job, error: JobError) {
        self.ctx.queue.finish(&job).await;
        self.fail_finished(job, error).await;
    }

    /// Record a terminal failure for a job the queue no longer tracks
    async fn fail_finished(&mut self, mut job: Job, error: JobError) {
        job.advance(JobState::Failed);
        self.report.failed += 1;
        warn!(
            "Job failed for material {} ({}), remote id {}: {}",
            job.material.title,
            job.material.id,
            job.attachment.remote_id(),
            error
        );
        self.ctx
            .run
            .job_failed(RunErrorEntry {
                material_id: job.material.id.clone(),
                material_title: job.material.title.clone(),
                attachment: job.attachment.display_name().to_string(),
                origin: error.origin().to_string(),
                message: error.to_string(),
            })
            .await;
    }

    fn should_stop(&self) -> bool {
        self.ctx.cancel.is_cancelled()
    }

    async fn process(&self, job: &mut Job) -> Result<Outcome, JobError> {
        job.advance(JobState::Resolving);
        let attachment = self.describe_if_needed(&job.attachment).await?;
        let plan = self.ctx.resolver.resolve_for(&job.material, &attachment)?;
        if self.should_stop() {
            return Ok(Outcome::Abandoned);
        }

        job.advance(JobState::Fetching);
        let content = self.ctx.fetcher.fetch(&plan, &self.ctx.cancel).await?;
        if self.should_stop() {
            return Ok(Outcome::Abandoned);
        }

        job.advance(JobState::Deduping);
        let digest = ContentDigest::of(&content.bytes);
        let mime_type = effective_mime(&content, &attachment);
        let file_name = file_name_for_plan(attachment.display_name(), &plan);
        let course_name = job.course_name.as_deref();

        let placer = &self.ctx.placer;
        let registration = self
            .ctx
            .dedup
            .register_with(digest, || {
                placer.place(course_name, &file_name, &mime_type, &content.bytes)
            })
            .await?;

        let status = if registration.is_new() {
            job.advance(JobState::Placing);
            RecordStatus::Stored
        } else {
            RecordStatus::Deduplicated
        };

        let record = self.build_record(
            job,
            &attachment,
            &plan,
            &content,
            mime_type,
            digest,
            status,
            registration.path().to_path_buf(),
        );
        self.ctx.store.insert_download_record(&record).await?;
        job.advance(JobState::Recorded);

        match registration {
            Registration::Inserted(path) => {
                info!("Stored {} at {}", job.display_name(), path.display());
                Ok(Outcome::Stored {
                    bytes: content.size,
                })
            }
            Registration::Existing(path) => {
                debug!(
                    "{} duplicates {} ({})",
                    job.display_name(),
                    path.display(),
                    digest.short()
                );
                Ok(Outcome::Deduplicated)
            }
        }
    }

    /// Fill in type and name from the file host when the listing left them out
    async fn describe_if_needed(&self, attachment: &Attachment) -> Result<Attachment, JobError> {
        let AttachmentSource::DriveFile {
            file_id,
            mime_type,
            alternate_link,
        } = &attachment.source
        else {
            return Ok(attachment.clone());
        };
        if mime_type.is_some() && attachment.title.is_some() {
            return Ok(attachment.clone());
        }

        let remote = self.ctx.fetcher.describe(file_id, &self.ctx.cancel).await?;
        Ok(Attachment {
            title: attachment.title.clone().or(Some(remote.name)),
            source: AttachmentSource::DriveFile {
                file_id: file_id.clone(),
                mime_type: mime_type.clone().or(Some(remote.mime_type)),
                alternate_link: alternate_link.clone().or(remote.web_view_link),
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        job: &Job,
        attachment: &Attachment,
        plan: &FetchPlan,
        content: &FetchedContent,
        mime_type: String,
        digest: ContentDigest,
        status: RecordStatus,
        local_path: PathBuf,
    ) -> DownloadRecord {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name_for_plan(attachment.display_name(), plan));
        let material = &job.material;

        DownloadRecord {
            id: None,
            material_id: material.id.clone(),
            attachment_id: attachment.remote_id().to_string(),
            title: attachment.display_name().to_string(),
            file_name,
            course_id: material.course_id.clone().filter(|id| !id.is_empty()),
            course_name: job.course_name.clone(),
            material_kind: material.kind,
            mime_type,
            local_path,
            size: content.size,
            digest,
            status,
            downloaded_at: Utc::now(),
            material_created_at: material.created_at,
            description: material.description.clone(),
            original_url: attachment
                .url()
                .map(str::to_string)
                .or_else(|| material.alternate_link.clone()),
            session_id: Some(self.ctx.run.session_id().to_string()),
        }
    }
}

/// Prefer the declared type when the host only reported a generic one
fn effective_mime(content: &FetchedContent, attachment: &Attachment) -> String {
    match attachment.declared_mime() {
        Some(declared)
            if content.mime_type == mime::OCTET_STREAM
                && !declared.starts_with(mime::NATIVE_PREFIX)
                && declared != mime::SHORTCUT =>
        {
            declared.to_string()
        }
        _ => content.mime_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(mime_type: &str) -> FetchedContent {
        FetchedContent {
            bytes: b"x".to_vec(),
            mime_type: mime_type.to_string(),
            size: 1,
        }
    }

    #[test]
    fn test_effective_mime() {
        let pdf = Attachment::drive("f", "Notes", mime::PDF);
        assert_eq!(effective_mime(&content(mime::OCTET_STREAM), &pdf), mime::PDF);
        assert_eq!(effective_mime(&content("image/png"), &pdf), "image/png");

        let doc = Attachment::drive("f", "Notes", mime::NATIVE_DOCUMENT);
        assert_eq!(effective_mime(&content(mime::PDF), &doc), mime::PDF);

        let link = Attachment::link("https://example.com", None);
        assert_eq!(
            effective_mime(&content(mime::TEXT_PLAIN), &link),
            mime::TEXT_PLAIN
        );
    }
}
