use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::job::{MediaMode, QualityHint};

use super::Result;

/// Durable record of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub locator: String,
    pub title: String,
    pub mode: MediaMode,
    pub quality: QualityHint,
    /// Artifact descriptor: the stored filename for single items, an
    /// "items: K/N" summary for collections.
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
    pub outcome: HistoryOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome recorded in the history log.
///
/// A collection that finished with some failed children is still a
/// completion variant, not an error; the counts are retained so a
/// stricter success policy could be layered on later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HistoryOutcome {
    Completed,
    PartialSuccess { items_completed: usize, items_failed: usize },
}

/// Append-only history log persisted as one JSON file.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryLog {
    /// Open the log at `path`, reconstructing the persisted sequence.
    /// A missing or corrupt file yields an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        info!(path = %path.display(), entries = entries.len(), "History log opened");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Durably append one entry. Once this returns `Ok`, the entry
    /// survives process restart.
    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(entry);
        persist(&self.path, &entries)
    }

    /// Snapshot of the full sequence, in write order.
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    /// Truncate the log to empty and persist that.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        persist(&self.path, &entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_entries(path: &Path) -> Vec<HistoryEntry> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "History file unreadable, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "History file malformed, starting empty");
            Vec::new()
        }
    }
}

/// Write the full sequence to `<path>.tmp`, fsync, then rename over the
/// canonical file. Previously committed entries are never at risk from
/// a crash mid-write.
fn persist(path: &Path, entries: &[HistoryEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(entries)?;
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
