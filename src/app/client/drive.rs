//! Remote file host access
//!
//! Metadata lookups, direct byte downloads and server-side exports. Rate
//! limiting and per-call deadlines are applied by the content fetcher that
//! drives this trait, so implementations only translate requests.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::http::HttpHandler;
use crate::constants::api;
use crate::errors::{ClientError, FetchError, FetchResult};

/// Metadata describing a remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub web_view_link: Option<String>,
}

/// Bytes returned by the file host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Byte-level access to the remote file host
#[async_trait]
pub trait FileHost: Send + Sync {
    async fn metadata(&self, file_id: &str) -> FetchResult<RemoteFile>;

    /// Direct byte GET of a stored file
    async fn download(&self, file_id: &str) -> FetchResult<HostedBytes>;

    /// Server-side conversion of a native file to `mime_type`
    async fn export(&self, file_id: &str, mime_type: &str) -> FetchResult<HostedBytes>;
}

/// File host REST client
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: HttpHandler,
    base_url: Url,
}

impl DriveClient {
    pub fn new(http: HttpHandler, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn file_url(&self, file_id: &str, suffix: &str) -> FetchResult<Url> {
        self.base_url
            .join(&format!("files/{}{}", file_id, suffix))
            .map_err(|e| FetchError::NotFound {
                file_id: format!("{} ({})", file_id, e),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    // The file host encodes int64 as a string
    size: Option<String>,
    web_view_link: Option<String>,
}

#[async_trait]
impl FileHost for DriveClient {
    async fn metadata(&self, file_id: &str) -> FetchResult<RemoteFile> {
        let mut url = self.file_url(file_id, "")?;
        url.query_pairs_mut()
            .append_pair("fields", api::DRIVE_METADATA_FIELDS)
            .append_pair("supportsAllDrives", "true");

        let file: WireFile = self
            .http
            .get_json(&url)
            .await
            .map_err(|e| to_fetch_error(file_id, e))?;

        Ok(RemoteFile {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            size: file.size.and_then(|s| s.parse().ok()),
            web_view_link: file.web_view_link,
        })
    }

    async fn download(&self, file_id: &str) -> FetchResult<HostedBytes> {
        let mut url = self.file_url(file_id, "")?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("supportsAllDrives", "true");

        let body = self
            .http
            .get_bytes(&url)
            .await
            .map_err(|e| to_fetch_error(file_id, e))?;
        Ok(HostedBytes {
            bytes: body.bytes,
            mime_type: body.content_type,
        })
    }

    async fn export(&self, file_id: &str, mime_type: &str) -> FetchResult<HostedBytes> {
        let mut url = self.file_url(file_id, "/export")?;
        url.query_pairs_mut().append_pair("mimeType", mime_type);

        let body = self
            .http
            .get_bytes(&url)
            .await
            .map_err(|e| to_fetch_error(file_id, e))?;
        Ok(HostedBytes {
            bytes: body.bytes,
            mime_type: Some(body.content_type.unwrap_or_else(|| mime_type.to_string())),
        })
    }
}

/// Classify a transport-level failure for retry policy
pub fn to_fetch_error(file_id: &str, error: ClientError) -> FetchError {
    match error {
        ClientError::Status { status, reason, .. } => {
            FetchError::from_status(file_id, status, reason.as_deref())
        }
        ClientError::Unauthorized => FetchError::PermissionDenied {
            file_id: file_id.to_string(),
        },
        ClientError::Http(e) if e.is_timeout() => FetchError::Transient {
            file_id: file_id.to_string(),
            reason: "request timed out".to_string(),
        },
        ClientError::Http(e) => FetchError::Transient {
            file_id: file_id.to_string(),
            reason: e.to_string(),
        },
        ClientError::MissingToken { var } => FetchError::PermissionDenied {
            file_id: format!("{} (no token in {})", file_id, var),
        },
        ClientError::InvalidUrl { .. } => FetchError::NotFound {
            file_id: file_id.to_string(),
        },
        ClientError::Decode { error, .. } => FetchError::Transient {
            file_id: file_id.to_string(),
            reason: format!("malformed response: {}", error),
        },
    }
}
