//! Fetcher capability: the seam between the job coordinator and the
//! acquisition machinery.
//!
//! The coordinator only ever talks to a `dyn Fetcher`: a metadata-only
//! [`Fetcher::probe`] that classifies a locator and enumerates
//! collection items, and a [`Fetcher::fetch`] that streams bytes to
//! disk. The production implementation is
//! [`crate::strategy::StrategyChain`]; tests substitute scripted
//! fetchers.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{JobKind, MediaMode, QualityHint};

/// Callback invoked with 0–100 progress percentages. Implementations
/// must tolerate out-of-order invocations; the registry clamps to
/// monotone non-decreasing values.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// A progress sink that discards updates.
pub fn null_progress_sink() -> ProgressSink {
    Arc::new(|_| {})
}

/// Cooperative cancellation flag shared between a job's execution unit
/// and the coordinator. Checked between strategy attempts and between
/// collection children; never preempts an in-flight operation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a metadata probe. No bytes are transferred.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub kind: JobKind,
    pub title: String,
    /// Item locators for collections, provider order preserved. Empty
    /// for single items.
    pub items: Vec<String>,
    /// Duration in seconds, when the provider reports one.
    pub duration: Option<u64>,
}

impl ProbeReport {
    pub fn single(title: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Single,
            title: title.into(),
            items: Vec::new(),
            duration: None,
        }
    }

    pub fn collection(title: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            kind: JobKind::Collection,
            title: title.into(),
            items,
            duration: None,
        }
    }
}

/// Parameters for one fetch operation.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub locator: String,
    pub mode: MediaMode,
    pub quality: QualityHint,
    /// Sanitized display title the artifact filename is derived from.
    pub title: String,
}

/// A successfully acquired local artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_size: Option<u64>,
}

/// One failed acquisition attempt, retained for operators when the
/// chain is exhausted.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub strategy: String,
    pub attempt: u32,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Metadata probe failed on every available strategy.
    #[error("metadata unavailable: {detail}")]
    MetadataUnavailable { detail: String },

    /// Every strategy in the chain failed; `detail` carries the last
    /// failure, `attempts` every recorded reason.
    #[error("all acquisition strategies exhausted: {detail}")]
    Exhausted {
        detail: String,
        attempts: Vec<AttemptRecord>,
    },

    /// Cancellation was observed at a checkpoint.
    #[error("canceled")]
    Canceled,
}

/// Abstract capability that probes metadata and retrieves media bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Classify the locator and gather display metadata. Metadata only;
    /// no bytes are transferred.
    async fn probe(&self, locator: &str, cancel: &CancelFlag) -> Result<ProbeReport, FetchError>;

    /// Acquire the resource, reporting progress through `sink`.
    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Artifact, FetchError>;
}
