//! Application constants for Classroom Sync
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Access token for the remote classroom and file host services
    pub const ACCESS_TOKEN: &str = "CLASSROOM_ACCESS_TOKEN";

    /// Overrides the download root from configuration
    pub const DOWNLOAD_ROOT: &str = "CLASSROOM_SYNC_ROOT";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Classroom-Sync/0.1.0";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;
}

/// Remote service endpoints
pub mod api {
    /// Classroom service base URL
    pub const CLASSROOM_BASE_URL: &str = "https://classroom.googleapis.com/v1";

    /// File host base URL
    pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

    /// Fields requested when describing a remote file
    pub const DRIVE_METADATA_FIELDS: &str = "id,name,mimeType,size,md5Checksum,webViewLink";

    /// Page size for classroom listing calls
    pub const PAGE_SIZE: u32 = 100;

    /// Course state filter for active-only listings
    pub const ACTIVE_COURSE_STATE: &str = "ACTIVE";
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default shared rate limit (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Default burst allowance on top of the steady rate
    pub const DEFAULT_RATE_BURST: u32 = 5;

    /// Maximum attempts per job before terminal failure
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Maximum backoff delay (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 60;

    /// Multiplier applied per retry
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Jitter factor for randomizing delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;

    /// Maximum jitter added when waiting for the rate gate (milliseconds)
    pub const RATE_JITTER_MS: u64 = 50;

    /// Per network call timeout for content transfers (seconds)
    pub const FETCH_TIMEOUT_SECS: u64 = 120;
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent job executors
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Smallest allowed pool
    pub const MIN_WORKER_COUNT: usize = 1;

    /// Largest allowed pool
    pub const MAX_WORKER_COUNT: usize = 10;
}

/// Sync Run progress reporting
pub mod progress {
    use super::Duration;

    /// Capacity of the rolling event log
    pub const EVENT_LOG_CAPACITY: usize = 50;

    /// Number of most recent errors exposed in a snapshot
    pub const ERRORS_SHOWN: usize = 10;

    /// CLI progress polling interval
    pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
}

/// File naming and placement
pub mod naming {
    /// Maximum file name length in characters, extension included
    pub const MAX_FILE_NAME_LENGTH: usize = 200;

    /// Maximum UTF-8 length of a file or directory name, leaving room for a
    /// collision suffix under the common 255-byte filesystem limit
    pub const MAX_NAME_BYTES: usize = 240;

    /// Maximum course directory name length
    pub const MAX_COURSE_DIR_LENGTH: usize = 100;

    /// Highest numeric suffix tried before giving up
    pub const MAX_COLLISION_SUFFIX: u32 = 9999;

    /// Fallback file name when sanitizing leaves nothing
    pub const UNTITLED_FILE: &str = "untitled";

    /// Fallback course directory name
    pub const UNTITLED_COURSE: &str = "Untitled_Course";

    /// Directory for materials without a course
    pub const UNCATEGORIZED_DIR: &str = "Uncategorized";

    /// Characters rejected on common filesystems
    pub const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    /// Prefix of temporary files written during placement
    pub const TEMP_FILE_PREFIX: &str = ".classroom-sync-";

    /// Number of announcement text characters used as a title
    pub const ANNOUNCEMENT_TITLE_LENGTH: usize = 100;
}

/// MIME type strings
pub mod mime {
    /// Prefix shared by all native (editable) remote formats
    pub const NATIVE_PREFIX: &str = "application/vnd.google-apps.";

    pub const NATIVE_DOCUMENT: &str = "application/vnd.google-apps.document";
    pub const NATIVE_SPREADSHEET: &str = "application/vnd.google-apps.spreadsheet";
    pub const NATIVE_PRESENTATION: &str = "application/vnd.google-apps.presentation";
    pub const NATIVE_DRAWING: &str = "application/vnd.google-apps.drawing";
    pub const NATIVE_FORM: &str = "application/vnd.google-apps.form";

    pub const PDF: &str = "application/pdf";
    pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    /// Declared type assigned to link, video and form shortcuts
    pub const SHORTCUT: &str = "text/x-classroom-link";
}

/// Storage locations
pub mod storage {
    /// Application directory name under the user's config and data dirs
    pub const APP_DIR_NAME: &str = "classroom-sync";

    /// Configuration file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Metadata database file name
    pub const DATABASE_FILE_NAME: &str = "classroom.db";

    /// Default download directory name
    pub const DOWNLOAD_DIR_NAME: &str = "ClassroomMaterials";
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

pub use env::ACCESS_TOKEN as ENV_ACCESS_TOKEN;
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_ATTEMPTS};
pub use workers::DEFAULT_WORKER_COUNT;
