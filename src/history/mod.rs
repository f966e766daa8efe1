//! Durable download history log.
//!
//! The history is a single pretty-printed JSON file holding an ordered
//! sequence of [`HistoryEntry`] records, one appended per job that
//! finishes `completed`. Entries are immutable once written; ordering
//! is write order.
//!
//! Durability contract: `append` rewrites the full sequence to a
//! sibling temp file, fsyncs it, then atomically renames it over the
//! canonical file, so a crash mid-write leaves the log either in its
//! pre-append or fully-appended state. `load` treats a missing or
//! malformed file as an empty history rather than a startup failure.
//!
//! Writers across concurrently-finishing jobs are serialized by an
//! internal mutex.

pub mod store;

pub use store::{HistoryEntry, HistoryLog, HistoryOutcome};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
