//! Core authenticated HTTP operations
//!
//! A thin layer over `reqwest` that attaches the bearer token and maps
//! non-success statuses to `ClientError`. Retries are not performed here; the
//! orchestrator's job state machine owns retry policy.

use std::sync::Arc;

use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::auth::TokenSource;
use crate::errors::{ClientError, ClientResult};

/// Body and content type of a byte download
#[derive(Debug, Clone)]
pub struct RawBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Authenticated HTTP operations handler
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpHandler {
    pub fn new(client: Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self { client, tokens }
    }

    /// Issue an authenticated GET and check the status
    ///
    /// # Errors
    ///
    /// * `ClientError::Unauthorized` on HTTP 401
    /// * `ClientError::Status` on any other non-success status
    /// * `ClientError::Http` on transport failure
    pub async fn get(&self, url: &Url) -> ClientResult<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(url.as_str())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = error_reason(&body);
            tracing::debug!(
                "GET {} returned {} ({})",
                redact(url),
                status,
                reason.as_deref().unwrap_or("no reason")
            );
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: redact(url),
                reason,
            });
        }

        Ok(response)
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> ClientResult<T> {
        let response = self.get(url).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ClientError::Decode {
            context: url.path().to_string(),
            error: e.to_string(),
        })
    }

    /// GET a raw byte body
    pub async fn get_bytes(&self, url: &Url) -> ClientResult<RawBody> {
        let response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(RawBody {
            bytes,
            content_type,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    errors: Vec<ErrorItem>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

/// First machine-readable reason in a JSON error body
fn error_reason(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error
        .errors
        .into_iter()
        .find_map(|item| item.reason)
        .or(parsed.error.status)
}

// Query strings may carry page tokens; keep log lines short
fn redact(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    )
}
