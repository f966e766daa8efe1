//! API models for the job submission and status endpoints.
//!
//! The external contract mirrors the job record directly: submission
//! via `POST /jobs` accepts a [`SubmitRequest`], status endpoints
//! return full [`crate::job::Job`] snapshots, and the history
//! endpoints expose [`crate::history::HistoryEntry`] records.
//!
//! A submission payload (as JSON):
//!
//! ```json
//! {
//!   "locator": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!   "mode": "audio",
//!   "quality": "highest"
//! }
//! ```
//!
//! `mode` defaults to `video` and `quality` to `highest` when omitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::history::HistoryEntry;
use crate::job::{Job, MediaMode, QualityHint};

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitRequest {
    pub locator: String,
    #[serde(default = "default_mode")]
    pub mode: MediaMode,
    #[serde(default = "default_quality")]
    pub quality: QualityHint,
}

fn default_mode() -> MediaMode {
    MediaMode::Video
}

fn default_quality() -> QualityHint {
    QualityHint::Highest
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
}

/// One artifact in the download directory listing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: String,
    pub size_bytes: u64,
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_fills_defaults() {
        let request: SubmitRequest =
            serde_json::from_str(r#"{"locator": "https://youtu.be/x"}"#).unwrap();
        assert_eq!(request.mode, MediaMode::Video);
        assert_eq!(request.quality, QualityHint::Highest);
    }

    #[test]
    fn submit_request_parses_explicit_fields() {
        let request: SubmitRequest = serde_json::from_str(
            r#"{"locator": "https://youtu.be/x", "mode": "audio", "quality": "720p"}"#,
        )
        .unwrap();
        assert_eq!(request.mode, MediaMode::Audio);
        assert_eq!(request.quality, QualityHint::Tier("720p".into()));
    }
}
