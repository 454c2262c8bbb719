//! Core application logic for Classroom Sync
//!
//! This module contains the remote clients, the domain models and the sync
//! engine: attachment resolution, content fetching, deduplication, placement,
//! the metadata store and the orchestration of concurrent Sync Runs.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classroom_sync::app::{MetadataStore, SearchQuery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MetadataStore::open("classroom.db".as_ref()).await?;
//!
//! for record in store.search(&SearchQuery::new().text("syllabus")).await? {
//!     println!("{} -> {}", record.title, record.local_path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dedup;
pub mod digest;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod placement;
pub mod queue;
pub mod rate;
pub mod resolver;
pub mod signals;
pub mod store;
pub mod sync_run;
pub mod worker;

// Re-export main public API
pub use client::{ClassroomClient, ClassroomSource, ClientConfig, DriveClient, FileHost};
pub use dedup::{DedupIndex, Registration};
pub use digest::ContentDigest;
pub use fetcher::{ContentFetcher, FetchedContent};
pub use models::{
    Attachment, AttachmentSource, Course, CourseState, DateRange, DownloadRecord, Material,
    MaterialKind, RecordStatus,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SyncRequest};
pub use placement::{Category, FilePlacer};
pub use rate::RateGate;
pub use resolver::{AttachmentResolver, FetchPlan};
pub use signals::CancelSignal;
pub use store::{MetadataStore, SearchQuery, Statistics};
pub use sync_run::{ProgressSnapshot, RunStatus, SyncSummary};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());

        let request = SyncRequest::all_active();
        assert!(request.course_ids.is_empty());
        assert!(request.range.is_unbounded());
    }
}
