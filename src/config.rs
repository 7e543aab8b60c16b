//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend endpoints and HTTP client settings
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL for login and token refresh
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,

    /// Base URL for the telemetry upload endpoint
    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,

    #[serde(default = "default_connect_timeout_s")]
    pub connect_timeout_s: u64,

    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
}

/// Upload scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,

    /// Oldest readings are dropped beyond this many. 0 disables the cap.
    #[serde(default = "default_max_buffered_readings")]
    pub max_buffered_readings: usize,
}

/// Persisted state configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Wearable boundary configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Watch application whose messages are ingested
    #[serde(default = "default_app_id")]
    pub app_id: String,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rotated log files. Console only when unset.
    #[serde(default)]
    pub file_dir: Option<String>,
}

// Default value functions
fn default_auth_base_url() -> String { "https://d3a-dev.atlantica.it/api".to_string() }
fn default_upload_base_url() -> String { "https://d3a.atlantica.it/api".to_string() }
fn default_connect_timeout_s() -> u64 { 30 }
fn default_request_timeout_s() -> u64 { 30 }

fn default_interval_s() -> u64 { 60 }
fn default_max_buffered_readings() -> usize { 10_000 }

fn default_data_dir() -> String { "./data".to_string() }

fn default_app_id() -> String { "a3421feed289106a538cb9547ab12095".to_string() }
fn default_event_channel_capacity() -> usize { 256 }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            auth_base_url: default_auth_base_url(),
            upload_base_url: default_upload_base_url(),
            connect_timeout_s: default_connect_timeout_s(),
            request_timeout_s: default_request_timeout_s(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            interval_s: default_interval_s(),
            max_buffered_readings: default_max_buffered_readings(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> SyncError {
    SyncError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wearable_sync::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("auth_base_url", &self.backend.auth_base_url),
            ("upload_base_url", &self.backend.upload_base_url),
        ] {
            if url.is_empty() {
                return Err(invalid(format!("{} cannot be empty", name)));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid(format!("{} must start with http:// or https://", name)));
            }
        }

        for (name, value) in [
            ("connect_timeout_s", self.backend.connect_timeout_s),
            ("request_timeout_s", self.backend.request_timeout_s),
        ] {
            if value == 0 || value > 300 {
                return Err(invalid(format!("{} must be between 1 and 300", name)));
            }
        }

        if self.upload.interval_s == 0 || self.upload.interval_s > 86_400 {
            return Err(invalid("interval_s must be between 1 and 86400"));
        }

        if self.storage.data_dir.is_empty() {
            return Err(invalid("storage data_dir cannot be empty"));
        }

        if self.device.app_id.is_empty() {
            return Err(invalid("device app_id cannot be empty"));
        }

        if self.device.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity must be greater than 0"));
        }

        if matches!(&self.logging.file_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging file_dir cannot be empty when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[backend]
auth_base_url = "http://localhost:8080/api"

[upload]
interval_s = 5

[storage]

[device]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.backend.auth_base_url, "http://localhost:8080/api");
        assert_eq!(config.backend.upload_base_url, default_upload_base_url());
        assert_eq!(config.upload.interval_s, 5);
        assert_eq!(config.upload.max_buffered_readings, 10_000);
        assert!(config.logging.file_dir.is_none());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.upload.interval_s, default_interval_s());
        assert_eq!(config.storage.data_dir, default_data_dir());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.upload.interval_s, 60);
        assert_eq!(config.device.app_id, default_app_id());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::load("/nonexistent/wearable-sync.toml");
        assert!(matches!(result, Err(SyncError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml("[upload\ninterval_s = 5");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_empty_auth_url() {
        let mut config = Config::default();
        config.backend.auth_base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upload_url_without_scheme() {
        let mut config = Config::default();
        config.backend.upload_base_url = "d3a.atlantica.it/api".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_timeout_zero() {
        let mut config = Config::default();
        config.backend.connect_timeout_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_too_high() {
        let mut config = Config::default();
        config.backend.request_timeout_s = 301;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_zero() {
        let mut config = Config::default();
        config.upload.interval_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_too_high() {
        let mut config = Config::default();
        config.upload.interval_s = 86_401;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unbounded_buffer_is_valid() {
        let mut config = Config::default();
        config.upload.max_buffered_readings = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_app_id() {
        let mut config = Config::default();
        config.device.app_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_channel_capacity() {
        let mut config = Config::default();
        config.device.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_set() {
        let mut config = Config::default();
        config.logging.file_dir = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_auth_base_url(), "https://d3a-dev.atlantica.it/api");
        assert_eq!(default_upload_base_url(), "https://d3a.atlantica.it/api");
        assert_eq!(default_connect_timeout_s(), 30);
        assert_eq!(default_request_timeout_s(), 30);
        assert_eq!(default_interval_s(), 60);
        assert_eq!(default_max_buffered_readings(), 10_000);
        assert_eq!(default_data_dir(), "./data");
        assert_eq!(default_event_channel_capacity(), 256);
    }
}
