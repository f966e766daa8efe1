//! Configuration management for mediagrab.
//!
//! Layered configuration, loaded from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mediagrab::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the
//! pattern `MEDIAGRAB__<section>__<key>`, e.g.
//! `MEDIAGRAB__SERVER__BIND_ADDR=0.0.0.0:9000` or
//! `MEDIAGRAB__DOWNLOAD__MAX_CONCURRENT_CHILDREN=5`.
//!
//! # Configuration File
//!
//! By default the configuration is loaded from `config/mediagrab.toml`;
//! override the path with the `MEDIAGRAB_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, DownloadConfig, HistoryConfig, ServerConfig, ToolConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or the
    /// validation pass fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_no_file_exists() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from_path(temp_dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.download.max_concurrent_children, 3);
        assert_eq!(config.tool.command, "yt-dlp");
        assert_eq!(
            config.history.path.file_name().unwrap(),
            "download_history.json"
        );
    }

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9999"
max_payload_bytes = "1MB"

[download]
dir = "media"
max_concurrent_children = 5
probe_timeout_secs = 20
fetch_timeout_secs = 300
retry_backoff_ms = 250

[history]
path = "state/history.json"

[tool]
command = "yt-dlp-nightly"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9999");
        assert_eq!(config.server.max_payload_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.download.max_concurrent_children, 5);
        assert_eq!(config.download.retry_backoff_ms, 250);
        assert_eq!(config.tool.command, "yt-dlp-nightly");
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[download]\nmax_concurrent_children = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_validation_rejects_empty_tool_command() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[tool]\ncommand = \"\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::EmptyToolCommand)
        ));
    }
}
