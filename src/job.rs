//! Core job record and lifecycle types.
//!
//! A [`Job`] is one tracked unit of acquisition work, either a single
//! media item or a collection (playlist) fanned out into child jobs.
//! Jobs live in the [`crate::registry::JobRegistry`] while active and
//! are summarized into the [`crate::history::HistoryLog`] once done.
//!
//! # State machine
//!
//! ```text
//! queued -> resolving -> downloading -> completed
//!                    \              \-> error
//!                     \-> error
//! (any non-terminal) -> canceled
//! ```
//!
//! Transitions are forward-only; a terminal job never changes status
//! again. [`Job::try_transition`] is the single gatekeeper for this.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tracked unit of acquisition work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier (UUIDv7), immutable after creation.
    pub id: String,
    /// The resource locator being fetched, immutable.
    pub locator: String,
    /// Single item or collection; classified once by the metadata probe.
    pub kind: JobKind,
    /// Caller-selected acquisition mode, immutable.
    pub mode: MediaMode,
    /// Caller-selected target quality tier, immutable.
    pub quality: QualityHint,
    pub status: JobStatus,
    /// 0–100, monotonically non-decreasing while resolving/downloading.
    pub progress: u8,
    /// Display title from the metadata probe, used for filename generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Back-reference to the owning collection job for child jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Ordered child job ids for collection jobs, empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Set exactly once, on the transition to `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
    /// Set exactly once, on the transition to `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a fresh `queued` job. Kind starts as `Single` and is
    /// corrected by the coordinator once the probe has classified the
    /// locator.
    pub fn new(
        id: impl Into<String>,
        locator: impl Into<String>,
        mode: MediaMode,
        quality: QualityHint,
    ) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            kind: JobKind::Single,
            mode,
            quality,
            status: JobStatus::Queued,
            progress: 0,
            title: None,
            parent_id: None,
            children: Vec::new(),
            result_path: None,
            error_detail: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Variant of [`Job::new`] for collection children.
    pub fn new_child(
        id: impl Into<String>,
        locator: impl Into<String>,
        parent: &Job,
    ) -> Self {
        let mut job = Self::new(id, locator, parent.mode, parent.quality.clone());
        job.parent_id = Some(parent.id.clone());
        job
    }

    /// Attempt a status transition, returning `false` (and leaving the
    /// job untouched) when the move is not allowed by the state machine.
    pub fn try_transition(&mut self, to: JobStatus) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Record observed progress, never regressing.
    pub fn observe_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
    }
}

/// Job status per the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Resolving,
    Downloading,
    Completed,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Canceled)
    }

    /// Forward-only transition check. `canceled` is reachable from any
    /// non-terminal state; terminal states accept nothing.
    pub fn can_transition(self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, JobStatus::Canceled) => true,
            (JobStatus::Queued, JobStatus::Resolving) => true,
            (JobStatus::Resolving, JobStatus::Downloading | JobStatus::Error) => true,
            (JobStatus::Downloading, JobStatus::Completed | JobStatus::Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Whether the locator resolved to one item or a collection of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Single,
    Collection,
}

/// Caller-selected acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    /// A single asset combining video and audio.
    Video,
    /// Audio-only asset.
    Audio,
}

impl MediaMode {
    /// Container extension used for generated filenames.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }
}

/// Caller-selected target quality tier.
///
/// Serialized as a plain string ("highest", "lowest", or a tier name
/// such as "720p") so API payloads and the history file stay readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityHint {
    Highest,
    Lowest,
    /// A named tier, e.g. "720p". Held verbatim; resolution against
    /// actually-available variants happens inside each strategy.
    Tier(String),
}

impl QualityHint {
    /// Vertical resolution for a named tier, when it parses as one.
    pub fn tier_height(&self) -> Option<u32> {
        match self {
            Self::Tier(t) => t.trim_end_matches('p').parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for QualityHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highest => f.write_str("highest"),
            Self::Lowest => f.write_str("lowest"),
            Self::Tier(t) => f.write_str(t),
        }
    }
}

impl From<&str> for QualityHint {
    fn from(value: &str) -> Self {
        match value {
            "highest" => Self::Highest,
            "lowest" => Self::Lowest,
            other => Self::Tier(other.to_string()),
        }
    }
}

impl Serialize for QualityHint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QualityHint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(QualityHint::from(raw.as_str()))
    }
}

/// Strip characters that are invalid in filenames on common filesystems.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_graph() {
        let mut job = Job::new("j1", "https://example.com", MediaMode::Video, QualityHint::Highest);
        assert!(job.try_transition(JobStatus::Resolving));
        assert!(job.try_transition(JobStatus::Downloading));
        assert!(job.try_transition(JobStatus::Completed));
        assert!(job.completed_at.is_some());

        // Terminal state accepts nothing, including cancel.
        assert!(!job.try_transition(JobStatus::Canceled));
        assert!(!job.try_transition(JobStatus::Error));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut job = Job::new("j2", "https://example.com", MediaMode::Audio, QualityHint::Lowest);
        assert!(!job.try_transition(JobStatus::Downloading));
        assert!(!job.try_transition(JobStatus::Completed));
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn cancel_reachable_from_any_non_terminal_state() {
        for setup in [JobStatus::Queued, JobStatus::Resolving, JobStatus::Downloading] {
            assert!(setup.can_transition(JobStatus::Canceled), "{setup}");
        }
        assert!(!JobStatus::Error.can_transition(JobStatus::Canceled));
    }

    #[test]
    fn progress_never_regresses() {
        let mut job = Job::new("j3", "https://example.com", MediaMode::Video, QualityHint::Highest);
        job.observe_progress(40);
        job.observe_progress(25);
        assert_eq!(job.progress, 40);
        job.observe_progress(120);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn quality_hint_round_trips_as_string() {
        for (raw, hint) in [
            ("\"highest\"", QualityHint::Highest),
            ("\"lowest\"", QualityHint::Lowest),
            ("\"720p\"", QualityHint::Tier("720p".to_string())),
        ] {
            let parsed: QualityHint = serde_json::from_str(raw).unwrap();
            assert_eq!(parsed, hint);
            assert_eq!(serde_json::to_string(&parsed).unwrap(), raw);
        }
        assert_eq!(QualityHint::Tier("720p".into()).tier_height(), Some(720));
        assert_eq!(QualityHint::Highest.tier_height(), None);
    }

    #[test]
    fn sanitize_title_strips_reserved_characters() {
        assert_eq!(sanitize_title("a<b>c:d\"e/f\\g|h?i*j"), "abcdefghij");
        assert_eq!(sanitize_title("  plain title  "), "plain title");
        assert_eq!(sanitize_title("???"), "untitled");
    }
}
