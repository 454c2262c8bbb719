//! Configuration management for Classroom Sync
//!
//! A single TOML file drives the remote clients, the sync engine and the
//! on-disk layout. Missing files fall back to defaults and a commented default
//! file is written on first run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::client::ClientConfig;
use crate::app::orchestrator::OrchestratorConfig;
use crate::app::queue::RetryPolicy;
use crate::app::worker::WorkerConfig;
use crate::constants::{api, env, http, limits, logging, progress, storage, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Remote service clients and the shared rate gate
    pub client: ClientConfigToml,
    /// Sync engine settings
    pub sync: SyncConfigToml,
    /// Download tree and metadata database locations
    pub storage: StorageConfigToml,
    pub logging: LoggingConfig,
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfigToml {
    pub classroom_base_url: String,
    pub drive_base_url: String,
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_per_host: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Requests per second shared by every remote call
    pub rate_limit_rps: u32,
    pub rate_burst: u32,
}

impl Default for ClientConfigToml {
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

/// TOML-friendly sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfigToml {
    /// Concurrent job executors (1-10)
    pub worker_count: usize,
    /// Attempts per job including the first
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    /// Deadline for each remote call made by a job
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    pub event_log_capacity: usize,
    pub errors_shown: usize,
}

impl Default for SyncConfigToml {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_attempts: limits::MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_secs(limits::MAX_BACKOFF_SECS),
            backoff_multiplier: limits::BACKOFF_MULTIPLIER,
            jitter_factor: limits::BACKOFF_JITTER_FACTOR,
            fetch_timeout: Duration::from_secs(limits::FETCH_TIMEOUT_SECS),
            event_log_capacity: progress::EVENT_LOG_CAPACITY,
            errors_shown: progress::ERRORS_SHOWN,
        }
    }
}

/// TOML-friendly storage configuration
///
/// Empty paths resolve to per-user defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StorageConfigToml {
    pub download_root: PathBuf,
    pub database_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
            colored_output: true,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            classroom_base_url: self.classroom_base_url.clone(),
            drive_base_url: self.drive_base_url.clone(),
            tcp_keepalive: self.tcp_keepalive,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            rate_limit_rps: self.rate_limit_rps,
            rate_burst: self.rate_burst,
        }
    }
}

impl SyncConfigToml {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }

    /// Convert to runtime WorkerConfig
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.worker_count,
            fetch_timeout: self.fetch_timeout,
            retry: self.retry_policy(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.errors_shown == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.errors_shown".to_string(),
                value: "0".to_string(),
                reason: "At least one error must be shown".to_string(),
            });
        }
        self.to_worker_config().validate()
    }
}

impl StorageConfigToml {
    /// Download root, resolving an empty setting to the default location
    pub fn download_root(&self) -> PathBuf {
        if self.download_root.as_os_str().is_empty() {
            default_download_root()
        } else {
            self.download_root.clone()
        }
    }

    /// Metadata database path, resolving an empty setting to the data dir
    pub fn database_path(&self) -> PathBuf {
        if self.database_path.as_os_str().is_empty() {
            default_database_path()
        } else {
            self.database_path.clone()
        }
    }
}

impl AppConfig {
    /// Runtime configuration for the remote clients and the orchestrator
    pub fn to_runtime_config(&self) -> (ClientConfig, OrchestratorConfig) {
        let orchestrator = OrchestratorConfig {
            download_root: self.storage.download_root(),
            worker: self.sync.to_worker_config(),
            event_log_capacity: self.sync.event_log_capacity,
            errors_shown: self.sync.errors_shown,
        };
        (self.client.to_runtime_config(), orchestrator)
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        let (client, orchestrator) = self.to_runtime_config();
        client.validate()?;
        self.sync.validate()?;
        orchestrator.validate()?;

        if logging_level(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: "Expected one of error, warn, info, debug, trace".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, or the first found in standard locations)
    /// 3. Environment variables
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        let config_path = match config_file_override {
            Some(ref path) => Some(path.clone()),
            None => Self::find_config_file()?,
        };

        if let Some(path) = config_path {
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                config = Self::load_from_file(&path).await?;
            } else if config_file_override.is_some() {
                return Err(ConfigError::NotFound { path });
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(env::DOWNLOAD_ROOT) {
            if !root.trim().is_empty() {
                debug!("Download root overridden by {}", env::DOWNLOAD_ROOT);
                self.storage.download_root = PathBuf::from(root.trim());
            }
        }
    }

    /// Initialize configuration on first run
    ///
    /// Creates a default config file if none exists. Returns the path only
    /// when a file was written.
    pub async fn initialize_first_run() -> ConfigResult<Option<PathBuf>> {
        let config_path = Self::get_default_config_path()?;
        if config_path.exists() {
            return Ok(None);
        }

        Self::write_default_config(&config_path).await?;
        info!("Created default configuration at {}", config_path.display());
        Ok(Some(config_path))
    }

    /// Write the commented default configuration to `path`
    pub async fn write_default_config(path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, Self::generate_default_config_content()).await?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> ConfigResult<Option<PathBuf>> {
        let search_paths = [
            PathBuf::from("./classroom-sync.toml"),
            Self::get_default_config_path()?,
        ];

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Ok(Some(path));
            }
        }

        debug!("No config file found in standard locations");
        Ok(None)
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::InvalidValue {
            field: "config_dir".to_string(),
            value: String::new(),
            reason: "Could not determine user config directory".to_string(),
        })?;

        Ok(config_dir
            .join(storage::APP_DIR_NAME)
            .join(storage::CONFIG_FILE_NAME))
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    fn generate_default_config_content() -> String {
        format!(
            r#"# Classroom Sync Configuration
# This file was automatically generated on first run.

[client]
classroom_base_url = "{classroom}"
drive_base_url = "{drive}"
tcp_keepalive = "30s"
pool_idle_timeout = "90s"
pool_max_per_host = {pool}
request_timeout = "60s"
connect_timeout = "30s"
# Shared by listing calls and file transfers
rate_limit_rps = {rps}
rate_burst = {burst}

[sync]
# Concurrent downloads (1-10)
worker_count = {workers}
# Attempts per file for transient failures, first attempt included
max_attempts = {attempts}
retry_base_delay = "1s"
retry_max_delay = "1m"
backoff_multiplier = 2.0
jitter_factor = 0.1
fetch_timeout = "2m"
event_log_capacity = {events}
errors_shown = {errors}

[storage]
# Leave empty for the defaults:
#   download_root -> {root}
#   database_path -> {database}
download_root = ""
database_path = ""

[logging]
level = "info"  # error, warn, info, debug, trace
colored_output = true
"#,
            classroom = api::CLASSROOM_BASE_URL,
            drive = api::DRIVE_BASE_URL,
            pool = http::POOL_MAX_PER_HOST,
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            burst = limits::DEFAULT_RATE_BURST,
            workers = workers::DEFAULT_WORKER_COUNT,
            attempts = limits::MAX_ATTEMPTS,
            events = progress::EVENT_LOG_CAPACITY,
            errors = progress::ERRORS_SHOWN,
            root = default_download_root().display(),
            database = default_database_path().display(),
        )
    }
}

/// Parse a log level name
pub fn logging_level(level: &str) -> Option<tracing::Level> {
    level.trim().parse().ok()
}

fn default_download_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(storage::DOWNLOAD_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(storage::DOWNLOAD_DIR_NAME))
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(storage::APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(storage::DATABASE_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.sync.worker_count, workers::DEFAULT_WORKER_COUNT);
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.event_log_capacity, 50);
        assert_eq!(config.sync.errors_shown, 10);
        assert_eq!(config.client.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    /// Test that the generated file parses back to the defaults
    ///
    /// Storage paths are written empty so they resolve at load time.
    #[test]
    fn test_config_file_generation() {
        let content = AppConfig::generate_default_config_content();
        let parsed: AppConfig = toml::from_str(&content).unwrap();

        assert_eq!(parsed, AppConfig::default());
        assert!(content.contains("# Classroom Sync Configuration"));
        assert!(content.contains("[sync]"));
    }

    #[tokio::test]
    async fn test_config_loading_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");

        let test_config = r#"
[sync]
worker_count = 8
retry_base_delay = "250ms"

[storage]
download_root = "/srv/materials"

[logging]
level = "debug"
"#;
        tokio::fs::write(&config_path, test_config).await.unwrap();

        let config = AppConfig::load(Some(config_path)).await.unwrap();
        assert_eq!(config.sync.worker_count, 8);
        assert_eq!(config.sync.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.sync.max_attempts, limits::MAX_ATTEMPTS);
        assert_eq!(config.logging.level, "debug");

        let (client, orchestrator) = config.to_runtime_config();
        assert_eq!(client.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(orchestrator.download_root, PathBuf::from("/srv/materials"));
        assert_eq!(orchestrator.worker.worker_count, 8);
        assert_eq!(
            orchestrator.worker.retry.base_delay,
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn test_invalid_worker_count_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        tokio::fs::write(&config_path, "[sync]\nworker_count = 11\n")
            .await
            .unwrap();

        let result = AppConfig::load(Some(config_path)).await;
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_toml() {
        let result: Result<AppConfig, _> = toml::from_str("[sync\nworker_count = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        assert_eq!(logging_level(" DEBUG "), Some(tracing::Level::DEBUG));
    }

    #[test]
    fn test_storage_defaults_resolve() {
        let paths = StorageConfigToml::default();
        assert!(paths.download_root().ends_with(storage::DOWNLOAD_DIR_NAME));
        assert!(paths.database_path().ends_with(storage::DATABASE_FILE_NAME));
    }

    #[tokio::test]
    async fn test_write_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        AppConfig::write_default_config(&path).await.unwrap();
        let loaded = AppConfig::load(Some(path)).await.unwrap();
        assert_eq!(loaded.sync, SyncConfigToml::default());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("retry_base_delay = \"1s\""));
    }
}
