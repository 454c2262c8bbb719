//! Error types for Classroom Sync
//!
//! This module defines the error taxonomy for every component of the sync
//! pipeline. Job-level errors never abort a Sync Run; they are accumulated into
//! the run's error list. Only listing failures that happen before any job is
//! enumerated are fatal for a run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors talking to the remote classroom service or the file host transport
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with a non-success status
    ///
    /// `reason` is the machine-readable reason from the error body, when present.
    #[error("Remote service returned HTTP {status} for {url}")]
    Status {
        status: u16,
        url: String,
        reason: Option<String>,
    },

    /// Access token rejected by the remote service
    #[error("Access token rejected by the remote service. Refresh credentials and retry")]
    Unauthorized,

    /// No access token available from the token source
    #[error("No access token available. Set {var} or provide a token source")]
    MissingToken { var: String },

    /// Invalid URL constructed from configuration
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Response body could not be decoded
    #[error("Failed to decode {context} response: {error}")]
    Decode { context: String, error: String },
}

/// Content Fetcher failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure, 5xx, or rate limited by the remote host (eligible for retry)
    #[error("Transient fetch error for {file_id}: {reason}")]
    Transient { file_id: String, reason: String },

    /// Remote access control rejected the request
    #[error("Permission denied for remote file {file_id}")]
    PermissionDenied { file_id: String },

    /// Remote object deleted or never existed
    #[error("Remote file {file_id} not found")]
    NotFound { file_id: String },

    /// The host refused the request itself; repeating it will not help
    #[error("Remote host rejected request for {file_id} with HTTP {status}")]
    Rejected { file_id: String, status: u16 },

    /// A single network call exceeded its deadline
    #[error("Fetch of {file_id} timed out after {seconds} seconds")]
    Timeout { file_id: String, seconds: u64 },

    /// The caller cancelled the run while the call was waiting to start
    #[error("Fetch of {file_id} cancelled")]
    Cancelled { file_id: String },
}

impl FetchError {
    /// Check if the failure may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. } | FetchError::Timeout { .. })
    }

    /// Map an HTTP status and error-body reason from the file host to a fetch error
    ///
    /// Only 408, 429, 5xx and a 403 carrying a rate-limit reason are transient.
    pub fn from_status(file_id: &str, status: u16, reason: Option<&str>) -> Self {
        let file_id = file_id.to_string();
        match status {
            403 if reason.is_some_and(is_rate_limit_reason) => FetchError::Transient {
                file_id,
                reason: format!("HTTP 403 {}", reason.unwrap_or_default()),
            },
            401 | 403 => FetchError::PermissionDenied { file_id },
            404 | 410 => FetchError::NotFound { file_id },
            408 | 429 | 500..=599 => FetchError::Transient {
                file_id,
                reason: format!("HTTP {}", status),
            },
            _ => FetchError::Rejected { file_id, status },
        }
    }
}

fn is_rate_limit_reason(reason: &str) -> bool {
    matches!(reason, "rateLimitExceeded" | "userRateLimitExceeded")
}

/// Attachment Resolver failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The declared type has no fetch strategy at all
    #[error("Unsupported attachment kind for '{title}': {mime_type}")]
    UnsupportedAttachmentKind { title: String, mime_type: String },
}

/// File placement failures
#[derive(Error, Debug)]
pub enum PlacementError {
    /// Every numeric suffix candidate is already taken
    #[error("No free file name for {base_name} in {directory} after {attempts} attempts")]
    CollisionExhausted {
        directory: PathBuf,
        base_name: String,
        attempts: u32,
    },

    /// I/O failure while creating directories or writing content
    #[error("File I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Content digest parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// Not a 64-character hex SHA-256 string
    #[error("Invalid content digest: {value}. Expected 64 hex characters")]
    InvalidDigest { value: String },
}

/// Metadata Store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored digest could not be parsed
    #[error(transparent)]
    Digest(#[from] DigestError),

    /// Stored enum value not recognised
    #[error("Unrecognised {field} value in database: {value}")]
    InvalidValue { field: String, value: String },
}

/// Terminal (or retryable) failure of one Material×Attachment job
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    /// Check if the job may re-enter `Pending`
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Fetch(e) if e.is_transient())
    }

    /// Distinguish remote-side failures from internal ones for display
    pub fn origin(&self) -> &'static str {
        match self {
            JobError::Fetch(_) => "remote",
            JobError::Resolve(_) => "unsupported",
            JobError::Placement(_) | JobError::Store(_) => "internal",
        }
    }
}

/// Sync Run level failures
#[derive(Error, Debug)]
pub enum SyncError {
    /// Another Sync Run is still live
    #[error("A sync run is already in progress (session {session_id})")]
    AlreadyActive { session_id: String },

    /// Remote listing failed before any job was enumerated
    #[error("Listing materials failed: {0}")]
    Listing(#[from] ClientError),

    /// Metadata store unavailable during setup or archival
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Request rejected before starting
    #[error("Invalid sync request: {reason}")]
    InvalidRequest { reason: String },

    /// A worker task panicked
    #[error("Worker {worker_id} terminated unexpectedly")]
    WorkerPanic { worker_id: u32 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialised
    #[error("Failed to serialise configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading or writing the configuration
    #[error("Configuration I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(e) => e.is_transient(),
            AppError::Client(ClientError::Http(_)) => true,
            AppError::Client(ClientError::Status { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Client(_) => "client",
            AppError::Fetch(_) => "fetch",
            AppError::Resolve(_) => "resolve",
            AppError::Placement(_) => "placement",
            AppError::Store(_) => "store",
            AppError::Sync(_) => "sync",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Client result type alias
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Placement result type alias
pub type PlacementResult<T> = std::result::Result<T, PlacementError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Sync result type alias
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
