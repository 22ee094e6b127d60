//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::CameraConfig;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub camera: CameraServiceConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Camera detection service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CameraServiceConfig {
    #[serde(default = "default_camera_url")]
    pub base_url: String,

    #[serde(default = "default_events_path")]
    pub events_path: String,

    #[serde(default = "default_camera_timeout")]
    pub request_timeout_secs: u64,
}

fn default_camera_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_events_path() -> String {
    "/api/camera/events".to_string()
}

fn default_camera_timeout() -> u64 {
    10
}

impl Default for CameraServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_camera_url(),
            events_path: default_events_path(),
            request_timeout_secs: default_camera_timeout(),
        }
    }
}

impl CameraServiceConfig {
    pub fn client_config(&self) -> CameraConfig {
        CameraConfig {
            base_url: self.base_url.clone(),
            events_path: self.events_path.clone(),
            request_timeout_ms: self.request_timeout_ms(),
            ..CameraConfig::default()
        }
    }

    fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_secs.checked_mul(1000).unwrap_or_else(|| {
            tracing::warn!(
                secs = self.request_timeout_secs,
                "Camera timeout too large, using default"
            );
            default_camera_timeout() * 1000
        })
    }
}

/// Subscriber hub limits
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    #[serde(default = "default_queue_capacity")]
    pub broadcast_capacity: usize,
}

fn default_max_connections() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            subscriber_queue_capacity: default_queue_capacity(),
            broadcast_capacity: default_queue_capacity(),
        }
    }
}

impl HubSettings {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.max_connections,
            queue_capacity: self.subscriber_queue_capacity.max(1),
            broadcast_capacity: self.broadcast_capacity.max(1),
        }
    }
}

/// SSE relay to the caller of `/api/camera/events`
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Lines buffered between the bridge and the HTTP response body
    #[serde(default = "default_relay_capacity")]
    pub capacity: usize,
}

fn default_relay_capacity() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: default_relay_capacity(),
        }
    }
}

/// Log database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("doorlog").join("doorlog.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./doorlog.db".to_string())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Site-local time settings
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Offset of the site's wall clock from UTC, in hours
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

fn default_utc_offset() -> i32 {
    7 // Asia/Jakarta
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl SiteConfig {
    /// The configured offset, or UTC if it is out of range
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(hours = self.utc_offset_hours, "Invalid UTC offset, using UTC");
                Utc.fix()
            })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("doorlog").join("config.toml")),
            Some(PathBuf::from("/etc/doorlog/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("DOORLOG_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("DOORLOG_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Some(url) = lookup("DOORLOG_CAMERA_URL") {
            self.camera.base_url = url;
        }

        if let Some(path) = lookup("DOORLOG_DATABASE_PATH") {
            self.database.path = path;
        }

        if let Some(level) = lookup("DOORLOG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DOORLOG_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Doorlog Configuration
#
# Environment variables override these settings:
# - DOORLOG_API_HOST
# - DOORLOG_API_PORT
# - DOORLOG_CAMERA_URL
# - DOORLOG_DATABASE_PATH
# - DOORLOG_LOG_LEVEL
# - DOORLOG_LOG_FORMAT

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8080

[camera]
# Camera detection service URL
base_url = "http://localhost:5000"

# SSE detection event stream on the camera service
events_path = "/api/camera/events"

# Timeout for camera control requests (seconds)
request_timeout_secs = 10

[hub]
# Maximum concurrent WebSocket subscribers
max_connections = 1000

# Outbound messages buffered per subscriber before it is evicted
subscriber_queue_capacity = 256

# Events buffered ahead of the broadcast dispatcher
broadcast_capacity = 256

[relay]
# Lines buffered for each /api/camera/events caller
capacity = 64

[database]
# SQLite database file
path = "./doorlog.db"

[site]
# Site wall clock offset from UTC (hours), used for "today" and default timestamps
utc_offset_hours = 7

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
