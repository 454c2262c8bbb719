//! Content fetching
//!
//! Executes a [`FetchPlan`] against the remote file host. Every remote call
//! first acquires the shared [`RateGate`], then runs under a per-call deadline.
//! Nothing is written to disk or to the dedup index here, so a fetch can be
//! retried freely.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::app::client::{FileHost, RemoteFile};
use crate::app::rate::RateGate;
use crate::app::resolver::FetchPlan;
use crate::app::signals::CancelSignal;
use crate::constants::mime;
use crate::errors::{FetchError, FetchResult};

/// Bytes produced by executing a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    /// Observed type of the payload
    pub mime_type: String,
    pub size: u64,
}

impl FetchedContent {
    fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            mime_type: mime_type.into(),
            size,
        }
    }
}

/// Rate-limited, deadline-bounded access to the file host
#[derive(Clone)]
pub struct ContentFetcher {
    host: Arc<dyn FileHost>,
    gate: RateGate,
    call_timeout: Duration,
}

impl std::fmt::Debug for ContentFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFetcher")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ContentFetcher {
    pub fn new(host: Arc<dyn FileHost>, gate: RateGate, call_timeout: Duration) -> Self {
        Self {
            host,
            gate,
            call_timeout,
        }
    }

    /// Look up remote metadata for a file
    pub async fn describe(&self, file_id: &str, cancel: &CancelSignal) -> FetchResult<RemoteFile> {
        self.call(file_id, cancel, self.host.metadata(file_id)).await
    }

    /// Execute a fetch plan
    ///
    /// # Errors
    ///
    /// * `FetchError::Cancelled` if the run was cancelled while waiting for the rate gate
    /// * `FetchError::Timeout` if the remote call exceeded its deadline
    /// * Any classification produced by the file host
    pub async fn fetch(&self, plan: &FetchPlan, cancel: &CancelSignal) -> FetchResult<FetchedContent> {
        match plan {
            FetchPlan::Direct { file_id } => {
                let hosted = self.call(file_id, cancel, self.host.download(file_id)).await?;
                let mime_type = hosted
                    .mime_type
                    .unwrap_or_else(|| mime::OCTET_STREAM.to_string());
                debug!("Downloaded {} ({} bytes)", file_id, hosted.bytes.len());
                Ok(FetchedContent::new(hosted.bytes, mime_type))
            }
            FetchPlan::Export { file_id, format } => {
                let hosted = self
                    .call(file_id, cancel, self.host.export(file_id, format.mime_type()))
                    .await?;
                debug!(
                    "Exported {} as {} ({} bytes)",
                    file_id,
                    format.extension(),
                    hosted.bytes.len()
                );
                Ok(FetchedContent::new(hosted.bytes, format.mime_type()))
            }
            FetchPlan::Shortcut(shortcut) => Ok(FetchedContent::new(
                shortcut.render().into_bytes(),
                mime::TEXT_PLAIN,
            )),
        }
    }

    async fn call<T, F>(&self, file_id: &str, cancel: &CancelSignal, request: F) -> FetchResult<T>
    where
        F: Future<Output = FetchResult<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { file_id: file_id.to_string() });
            }
            _ = self.gate.acquire() => {}
        }

        match tokio::time::timeout(self.call_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                file_id: file_id.to_string(),
                seconds: self.call_timeout.as_secs(),
            }),
        }
    }
}
