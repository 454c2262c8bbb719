//! Remote service clients
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `auth`: bearer token sources
//! - `http`: authenticated request layer
//! - `classroom`: course and material listings (`ClassroomSource`)
//! - `drive`: file metadata, downloads and exports (`FileHost`)

use std::sync::Arc;

pub mod auth;
pub mod classroom;
pub mod config;
pub mod drive;
pub mod http;

pub use auth::{EnvTokenSource, StaticToken, TokenSource};
pub use classroom::{ClassroomClient, ClassroomSource};
pub use config::ClientConfig;
pub use drive::{DriveClient, FileHost, HostedBytes, RemoteFile};
pub use http::HttpHandler;

use crate::app::rate::RateGate;
use crate::errors::ClientResult;

/// Build both REST clients over one connection pool
///
/// Listing calls acquire `gate` themselves; file host calls are gated by the
/// content fetcher.
pub fn build_clients(
    config: &ClientConfig,
    tokens: Arc<dyn TokenSource>,
    gate: RateGate,
) -> ClientResult<(ClassroomClient, DriveClient)> {
    let http = HttpHandler::new(config.build_http_client()?, tokens);
    let classroom = ClassroomClient::new(http.clone(), gate, config.classroom_url()?);
    let drive = DriveClient::new(http, config.drive_url()?);

    tracing::debug!(
        "Built clients for {} and {}",
        config.classroom_base_url,
        config.drive_base_url
    );
    Ok((classroom, drive))
}
