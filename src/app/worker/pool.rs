//! Worker pool management
//!
//! Spawns a fixed number of [`SyncWorker`]s over one shared context and joins
//! them when the queue drains.

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::WorkerConfig;
use super::core::{SyncWorker, WorkerContext, WorkerReport};
use crate::errors::{SyncError, SyncResult};

/// Pool of job executors for one Sync Run
#[derive(Debug)]
pub struct WorkerPool {
    config: WorkerConfig,
    handles: Vec<(u32, JoinHandle<WorkerReport>)>,
}

impl WorkerPool {
    /// Start `config.worker_count` workers sharing `ctx`
    pub fn start(config: WorkerConfig, ctx: WorkerContext) -> Self {
        info!("Starting {} workers", config.worker_count);

        let handles = (0..config.worker_count as u32)
            .map(|worker_id| {
                let worker = SyncWorker::new(worker_id, ctx.clone());
                (worker_id, tokio::spawn(worker.run()))
            })
            .collect();

        Self { config, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Wait for every worker to exit
    ///
    /// All workers are awaited even if one panicked; the first panic is then
    /// reported as an error.
    pub async fn join(self) -> SyncResult<Vec<WorkerReport>> {
        let (ids, handles): (Vec<u32>, Vec<_>) = self.handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut reports = Vec::with_capacity(results.len());
        let mut panicked = None;
        for (worker_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("Worker {} terminated unexpectedly: {}", worker_id, e);
                    panicked.get_or_insert(worker_id);
                }
            }
        }

        if let Some(worker_id) = panicked {
            return Err(SyncError::WorkerPanic { worker_id });
        }

        info!("Worker pool finished");
        Ok(reports)
    }
}
