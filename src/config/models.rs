use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub tool: ToolConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound on request body size.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Download execution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Directory artifacts are written to.
    #[serde(default = "default_download_dir")]
    pub dir: PathBuf,
    /// Bound on concurrently in-flight children of one collection job.
    #[serde(default = "default_max_concurrent_children")]
    pub max_concurrent_children: usize,
    /// Wall-clock budget for one metadata probe attempt.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Wall-clock budget for one full fetch attempt.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Fixed pause before retrying a transient strategy failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl DownloadConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: default_download_dir(),
            max_concurrent_children: default_max_concurrent_children(),
            probe_timeout_secs: default_probe_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// History log configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Path of the JSON history file.
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

/// External downloader tool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Command invoked by the external-tool strategy (yt-dlp compatible).
    #[serde(default = "default_tool_command")]
    pub command: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: default_tool_command(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024) // 64 KB, submit payloads are tiny
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent_children() -> usize {
    3
}

fn default_probe_timeout_secs() -> u64 {
    45
}

fn default_fetch_timeout_secs() -> u64 {
    600
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_history_path() -> PathBuf {
    PathBuf::from("download_history.json")
}

fn default_tool_command() -> String {
    "yt-dlp".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.max_payload_bytes.as_u64(), 64 * 1024);
        assert_eq!(config.download.dir, PathBuf::from("downloads"));
        assert_eq!(config.download.max_concurrent_children, 3);
        assert_eq!(config.history.path, PathBuf::from("download_history.json"));
        assert_eq!(config.tool.command, "yt-dlp");
    }

    #[test]
    fn parses_directly_from_toml() {
        let config: Config = toml::from_str(
            r#"
[server]
bind_addr = "127.0.0.1:9000"

[download]
max_concurrent_children = 2
fetch_timeout_secs = 120

[tool]
command = "youtube-dl"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.download.max_concurrent_children, 2);
        assert_eq!(config.download.fetch_timeout(), Duration::from_secs(120));
        assert_eq!(config.download.probe_timeout(), Duration::from_secs(45));
        assert_eq!(config.download.retry_backoff(), Duration::from_millis(2000));
        assert_eq!(config.tool.command, "youtube-dl");
    }
}
