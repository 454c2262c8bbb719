//! Access token sources
//!
//! Obtaining and refreshing OAuth tokens belongs to the identity provider
//! integration. The clients only need a bearer token per request, which they
//! pull from a [`TokenSource`].

use std::env;

use async_trait::async_trait;

use crate::constants::env as env_constants;
use crate::errors::{ClientError, ClientResult};

/// Provides bearer tokens for remote calls
#[async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    async fn access_token(&self) -> ClientResult<String>;
}

/// Reads the token from an environment variable on every call
///
/// Re-reading lets an external refresher rotate the value without
/// restarting a long sync.
#[derive(Debug, Clone)]
pub struct EnvTokenSource {
    var: String,
}

impl EnvTokenSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenSource {
    fn default() -> Self {
        Self::new(env_constants::ACCESS_TOKEN)
    }
}

#[async_trait]
impl TokenSource for EnvTokenSource {
    async fn access_token(&self) -> ClientResult<String> {
        match env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ClientError::MissingToken {
                var: self.var.clone(),
            }),
        }
    }
}

/// Fixed token
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> ClientResult<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_token_missing() {
        let source = EnvTokenSource::new("CLASSROOM_SYNC_TEST_TOKEN_UNSET");
        let err = source.access_token().await.unwrap_err();
        assert!(matches!(err, ClientError::MissingToken { var } if var == "CLASSROOM_SYNC_TEST_TOKEN_UNSET"));
    }

    #[tokio::test]
    async fn test_env_token_trimmed() {
        env::set_var("CLASSROOM_SYNC_TEST_TOKEN_SET", "  abc123 \n");
        let source = EnvTokenSource::new("CLASSROOM_SYNC_TEST_TOKEN_SET");
        assert_eq!(source.access_token().await.unwrap(), "abc123");
    }

    #[test]
    fn test_static_token_hidden_in_debug() {
        let token = StaticToken::new("secret");
        assert_eq!(format!("{:?}", token), "StaticToken(***)");
    }
}
