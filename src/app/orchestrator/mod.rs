//! Download orchestration
//!
//! The orchestrator is the control plane of a Sync Run. It enumerates the
//! selected courses and their materials, fixes the run's total, seeds the
//! dedup index from previously recorded digests, fans the resulting jobs out
//! over a bounded [`WorkerPool`] and finally archives the run's summary.
//!
//! Only a failure of the listing calls ends a run without completing it.
//! Individual jobs may fail, retry or be skipped as duplicates without
//! affecting their siblings.
//!
//! # Module Organization
//!
//! - [`config`] - orchestrator configuration and `SyncRequest`
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classroom_sync::app::client::{build_clients, ClientConfig, EnvTokenSource};
//! use classroom_sync::app::orchestrator::{Orchestrator, OrchestratorConfig, SyncRequest};
//! use classroom_sync::app::rate::RateGate;
//! use classroom_sync::app::store::MetadataStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let gate = RateGate::new(10, 5, Duration::from_millis(50))?;
//! let (classroom, drive) = build_clients(&config, Arc::new(EnvTokenSource::default()), gate.clone())?;
//! let store = MetadataStore::open("classroom.db".as_ref()).await?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(classroom),
//!     Arc::new(drive),
//!     store,
//!     gate,
//!     OrchestratorConfig::new("ClassroomMaterials"),
//! )?;
//! let summary = orchestrator.run(SyncRequest::for_courses(["12345"])).await?;
//! println!("{} downloaded, {} duplicates", summary.completed, summary.skipped);
//! # Ok(())
//! # }
//! ```

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::client::{ClassroomSource, FileHost};
use crate::app::dedup::DedupIndex;
use crate::app::fetcher::ContentFetcher;
use crate::app::models::Course;
use crate::app::placement::FilePlacer;
use crate::app::queue::{Job, JobQueue};
use crate::app::rate::RateGate;
use crate::app::resolver::AttachmentResolver;
use crate::app::signals::CancelSignal;
use crate::app::store::{MetadataStore, SyncRunArchive};
use crate::app::sync_run::{ProgressSnapshot, RunStatus, SyncRun, SyncSummary, SyncTracker};
use crate::app::worker::{WorkerContext, WorkerPool};
use crate::constants::naming;
use crate::errors::{ConfigError, SyncResult};

pub use config::{OrchestratorConfig, SyncRequest};

/// Coordinates Sync Runs over shared clients, store and dedup index
#[derive(Clone)]
pub struct Orchestrator {
    source: Arc<dyn ClassroomSource>,
    fetcher: ContentFetcher,
    store: MetadataStore,
    placer: FilePlacer,
    dedup: Arc<DedupIndex>,
    tracker: Arc<SyncTracker>,
    cancel: Arc<RwLock<CancelSignal>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("dedup_entries", &self.dedup.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// `gate` is the single rate budget shared by every content fetch; pass the
    /// same gate the listing client uses to bound total request volume.
    pub fn new(
        source: Arc<dyn ClassroomSource>,
        host: Arc<dyn FileHost>,
        store: MetadataStore,
        gate: RateGate,
        config: OrchestratorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            source,
            fetcher: ContentFetcher::new(host, gate, config.worker.fetch_timeout),
            store,
            placer: FilePlacer::new(&config.download_root),
            dedup: Arc::new(DedupIndex::new()),
            tracker: Arc::new(SyncTracker::new()),
            cancel: Arc::new(RwLock::new(CancelSignal::new())),
            config,
        })
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Progress of the current (or most recent) run
    pub async fn status(&self) -> ProgressSnapshot {
        self.tracker.snapshot().await
    }

    /// Cancel the live run, if any
    ///
    /// Jobs already in a transition finish it; nothing new is dequeued.
    pub async fn cancel(&self) {
        let cancel = self.cancel.read().await;
        if !cancel.is_cancelled() {
            info!("Cancelling sync run");
            cancel.cancel();
        }
    }

    /// Run a sync in the background
    pub fn spawn(&self, request: SyncRequest) -> JoinHandle<SyncResult<SyncSummary>> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run(request).await })
    }

    /// Run a sync to completion
    pub async fn run(&self, request: SyncRequest) -> SyncResult<SyncSummary> {
        self.run_with_cancel(request, CancelSignal::new()).await
    }

    /// Run a sync that also stops when `cancel` is raised by the caller
    ///
    /// # Errors
    ///
    /// * `SyncError::InvalidRequest` if the request is malformed
    /// * `SyncError::AlreadyActive` if another run is live
    /// * `SyncError::Listing` if enumerating courses or materials failed
    /// * `SyncError::Store` if courses could not be recorded
    pub async fn run_with_cancel(
        &self,
        request: SyncRequest,
        cancel: CancelSignal,
    ) -> SyncResult<SyncSummary> {
        request.validate()?;
        let course_ids = request.normalized_course_ids();
        let session_id = new_session_id();

        let run = Arc::new(SyncRun::with_limits(
            session_id.clone(),
            course_ids.clone(),
            request.range,
            self.config.event_log_capacity,
            self.config.errors_shown,
        ));
        self.tracker.start(run.clone()).await?;
        *self.cancel.write().await = cancel.clone();

        info!(
            "Sync run {} starting for {} courses",
            session_id,
            if course_ids.is_empty() {
                "all active".to_string()
            } else {
                course_ids.len().to_string()
            }
        );

        let jobs = match self.enumerate(&course_ids, &request).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Sync run {} failed during enumeration: {}", session_id, e);
                run.finish(RunStatus::Failed).await;
                self.archive(&run).await;
                return Err(e);
            }
        };

        let seeded = self.seed_dedup().await;
        info!(
            "Enumerated {} jobs ({} known digests loaded)",
            jobs.len(),
            seeded
        );
        run.begin(jobs.len() as u64).await;

        if cancel.is_cancelled() {
            run.finish(RunStatus::Cancelled).await;
            return Ok(self.archive(&run).await);
        }

        let mut worker_config = self.config.worker.clone();
        if let Some(count) = request.worker_count {
            worker_config.worker_count = count;
        }
        let queue = Arc::new(JobQueue::with_jobs(worker_config.retry.clone(), jobs));

        let ctx = WorkerContext {
            queue: queue.clone(),
            run: run.clone(),
            fetcher: self.fetcher.clone(),
            resolver: AttachmentResolver::new(),
            dedup: self.dedup.clone(),
            placer: self.placer.clone(),
            store: self.store.clone(),
            cancel: cancel.clone(),
        };

        let joined = WorkerPool::start(worker_config, ctx).join().await;

        let status = if cancel.is_cancelled() {
            let abandoned = queue.close().await;
            warn!("Sync run {} cancelled, {} jobs not started", session_id, abandoned);
            RunStatus::Cancelled
        } else if joined.is_err() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.finish(status).await;
        let summary = self.archive(&run).await;
        joined?;

        info!(
            "Sync run {} {}: {} downloaded, {} duplicates skipped, {} failed of {}",
            summary.session_id,
            summary.status,
            summary.completed,
            summary.skipped,
            summary.failed,
            summary.total
        );
        Ok(summary)
    }

    /// Build the run's job list; the list is fixed from here on
    async fn enumerate(&self, course_ids: &[String], request: &SyncRequest) -> SyncResult<Vec<Job>> {
        let courses = if course_ids.is_empty() {
            self.source.list_courses(true).await?
        } else {
            let mut courses = Vec::with_capacity(course_ids.len());
            for course_id in course_ids {
                courses.push(self.source.get_course(course_id).await?);
            }
            courses
        };

        let names: HashMap<String, String> = courses
            .iter()
            .map(|course| (course.id.clone(), display_name(course)))
            .collect();

        let mut jobs = Vec::new();
        for course in &courses {
            self.store.upsert_course(course).await?;
            let materials = self.source.list_materials(&course.id, &request.range).await?;

            for material in materials {
                let course_name = material
                    .course_id
                    .as_ref()
                    .and_then(|id| names.get(id).cloned());
                let material = Arc::new(material);

                for attachment in &material.attachments {
                    jobs.push(Job::new(
                        jobs.len() as u64 + 1,
                        material.clone(),
                        attachment.clone(),
                        course_name.clone(),
                    ));
                }
            }
        }

        Ok(jobs)
    }

    async fn seed_dedup(&self) -> usize {
        // Files may have been removed since the last run
        self.dedup.clear();
        match self.store.known_digests().await {
            Ok(known) => self.dedup.seed(known).await,
            Err(e) => {
                warn!("Could not load known digests, duplicates of earlier runs will be stored again: {}", e);
                0
            }
        }
    }

    /// Archive the run's summary; archival problems are logged, not fatal
    async fn archive(&self, run: &SyncRun) -> SyncSummary {
        let summary = run.summary().await;
        if let Err(e) = self
            .store
            .archive_sync_run(&SyncRunArchive::from(&summary))
            .await
        {
            warn!("Failed to archive sync run {}: {}", summary.session_id, e);
        }
        summary
    }
}

/// Directory name for a known course; only materials without one are uncategorized
fn display_name(course: &Course) -> String {
    let name = course.name.trim();
    if name.is_empty() {
        naming::UNTITLED_COURSE.to_string()
    } else {
        name.to_string()
    }
}

fn new_session_id() -> String {
    format!(
        "{}-{:04x}",
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        fastrand::u16(..)
    )
}
