//! Configuration module for the B2 relay
//!
//! Handles loading YAML configuration files with environment variable
//! expansion, building configuration straight from the process environment,
//! and validating the result before the server starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::{expand_env_vars, ConfigLoader};

/// Default B2 authorization endpoint (v2 API).
pub const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

/// B2's floor for every part except the last (decimal megabytes).
pub const DEFAULT_MIN_PART_SIZE: usize = 5 * 1000 * 1000;

/// Largest page `b2_list_parts` accepts.
pub const MAX_LIST_PARTS_PAGE_SIZE: u32 = 1000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub b2: B2Config,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from environment variables only.
    ///
    /// Reads `B2_ACCOUNT_ID`, `B2_APPLICATION_KEY`, `API_TOKEN`, `B2_BUCKET_ID`
    /// and `B2_BUCKET_NAME`. `RELAY_ADDRESS` overrides the listen address.
    /// Everything else takes its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        fn required(name: &'static str) -> Result<String, ConfigError> {
            std::env::var(name).map_err(|_| ConfigError::MissingEnv(name))
        }

        let mut server = ServerConfig::default();
        if let Ok(address) = std::env::var("RELAY_ADDRESS") {
            server.address = address;
        }

        let config = Config {
            server,
            auth: AuthConfig {
                api_token: required("API_TOKEN")?,
            },
            b2: B2Config {
                account_id: required("B2_ACCOUNT_ID")?,
                application_key: required("B2_APPLICATION_KEY")?,
                bucket_id: required("B2_BUCKET_ID")?,
                bucket_name: required("B2_BUCKET_NAME")?,
                auth_url: default_auth_url(),
                timeout_seconds: default_b2_timeout(),
            },
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secrets = [
            ("auth.api_token", &self.auth.api_token),
            ("b2.account_id", &self.b2.account_id),
            ("b2.application_key", &self.b2.application_key),
            ("b2.bucket_id", &self.b2.bucket_id),
            ("b2.bucket_name", &self.b2.bucket_name),
        ];

        for (name, value) in secrets {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} cannot be empty",
                    name
                )));
            }
            if has_unexpanded_placeholder(value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} references an unset environment variable: {}",
                    name, value
                )));
            }
        }

        if !is_valid_http_url(&self.b2.auth_url) {
            return Err(ConfigError::ValidationError(
                "Invalid b2.auth_url: must start with http:// or https://".into(),
            ));
        }

        if !self.server.upload_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "server.upload_path '{}' must start with /",
                self.server.upload_path
            )));
        }

        if self.upload.min_part_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.min_part_size must be greater than zero".into(),
            ));
        }

        // A body limit below the part floor would make every multi-part upload impossible
        if self.server.max_body_bytes < self.upload.min_part_size {
            return Err(ConfigError::ValidationError(format!(
                "server.max_body_bytes ({}) is smaller than upload.min_part_size ({})",
                self.server.max_body_bytes, self.upload.min_part_size
            )));
        }

        if self.upload.list_parts_page_size == 0
            || self.upload.list_parts_page_size > MAX_LIST_PARTS_PAGE_SIZE
        {
            return Err(ConfigError::ValidationError(format!(
                "upload.list_parts_page_size {} must be between 1 and {}",
                self.upload.list_parts_page_size, MAX_LIST_PARTS_PAGE_SIZE
            )));
        }

        if self.b2.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "b2.timeout_seconds must be greater than zero".into(),
            ));
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid logging.format '{}': must be 'json' or 'pretty'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn has_unexpanded_placeholder(value: &str) -> bool {
    value.contains("${")
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Path of the single upload endpoint
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// Largest request body accepted, after which the request fails
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            upload_path: default_upload_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_upload_path() -> String {
    "/upload".to_string()
}

fn default_max_body_bytes() -> usize {
    104857600 // 100MB
}

/// Inbound authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token every caller must present
    pub api_token: String,
}

/// Backblaze B2 account and bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct B2Config {
    pub account_id: String,
    pub application_key: String,
    pub bucket_id: String,
    /// Bucket name, used to build public download URLs
    pub bucket_name: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Per-call timeout for B2 requests
    #[serde(default = "default_b2_timeout")]
    pub timeout_seconds: u64,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_b2_timeout() -> u64 {
    120
}

/// Upload policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Minimum bytes a caller must accumulate before sending a non-final part
    #[serde(default = "default_min_part_size")]
    pub min_part_size: usize,
    #[serde(default = "default_mime_type")]
    pub default_mime_type: String,
    #[serde(default = "default_list_parts_page_size")]
    pub list_parts_page_size: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            min_part_size: default_min_part_size(),
            default_mime_type: default_mime_type(),
            list_parts_page_size: default_list_parts_page_size(),
        }
    }
}

fn default_min_part_size() -> usize {
    DEFAULT_MIN_PART_SIZE
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

fn default_list_parts_page_size() -> u32 {
    MAX_LIST_PARTS_PAGE_SIZE
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve `GET /metrics` on the main listener
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
