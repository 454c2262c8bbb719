//! HTTP client configuration and building logic
//!
//! Connection settings shared by the classroom and file host clients, plus
//! the parameters of the shared rate gate.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{api, http, limits};
use crate::errors::{ClientError, ClientResult, ConfigError};

/// Configuration for the remote service clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Classroom service base URL
    pub classroom_base_url: String,
    /// File host base URL
    pub drive_base_url: String,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Shared rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Burst allowance for the rate gate
    pub rate_burst: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            classroom_base_url: api::CLASSROOM_BASE_URL.to_string(),
            drive_base_url: api::DRIVE_BASE_URL.to_string(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            rate_burst: limits::DEFAULT_RATE_BURST,
        }
    }
}

impl ClientConfig {
    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> ClientResult<Client> {
        let mut client_builder = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(ClientError::Http)
    }

    /// Parsed classroom base URL
    pub fn classroom_url(&self) -> ClientResult<Url> {
        parse_base(&self.classroom_base_url)
    }

    /// Parsed file host base URL
    pub fn drive_url(&self) -> ClientResult<Url> {
        parse_base(&self.drive_base_url)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "Rate limit must be at least 1 request per second".to_string(),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout".to_string(),
                value: "0s".to_string(),
                reason: "Request timeout must be non-zero".to_string(),
            });
        }

        for (field, value) in [
            ("classroom_base_url", &self.classroom_base_url),
            ("drive_base_url", &self.drive_base_url),
        ] {
            if Url::parse(value).is_err() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: "Must be an absolute URL".to_string(),
                });
            }
        }

        Ok(())
    }
}

// Base URLs need a trailing slash so `Url::join` appends instead of replacing
fn parse_base(value: &str) -> ClientResult<Url> {
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{}/", value)
    };
    Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl {
        url: value.to_string(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_client_creation() {
        let config = ClientConfig::default();
        assert!(config.build_http_client().is_ok());
    }

    #[test]
    fn test_base_urls_join_relative_paths() {
        let config = ClientConfig::default();
        let url = config.drive_url().unwrap().join("files/abc").unwrap();
        assert_eq!(url.as_str(), "https://www.googleapis.com/drive/v3/files/abc");

        let url = config.classroom_url().unwrap().join("courses").unwrap();
        assert_eq!(url.as_str(), "https://classroom.googleapis.com/v1/courses");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = ClientConfig {
            rate_limit_rps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            drive_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
