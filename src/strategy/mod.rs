//! Acquisition strategies and the fallback chain.
//!
//! A [`Strategy`] is one concrete way of acquiring a remote media
//! resource. Strategies are tried in strict priority order by the
//! [`StrategyChain`], which implements the [`crate::fetcher::Fetcher`]
//! capability: a strategy that fails for any reason is abandoned and
//! the next one tried, so no single library or tool failure decides a
//! job's outcome.
//!
//! ## Built-ins
//!
//! - [`DirectHttpStrategy`] — streams a direct media URL to disk with
//!   byte-accurate progress.
//! - [`ExternalToolStrategy`] — delegates to a yt-dlp-style command,
//!   probing metadata via `--dump-json` and emitting coarse synthetic
//!   progress while the tool runs.
//!
//! Quality/mode resolution against the variants a strategy actually
//! sees lives in [`quality`].

pub mod chain;
pub mod direct;
pub mod external;
pub mod quality;

pub use chain::{ChainConfig, StrategyChain};
pub use direct::DirectHttpStrategy;
pub use external::ExternalToolStrategy;
pub use quality::{StreamVariant, select_variant};

use async_trait::async_trait;
use thiserror::Error;

use crate::fetcher::{Artifact, CancelFlag, FetchRequest, ProbeReport, ProgressSink};

/// Failure modes of a single strategy attempt.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The strategy does not handle this locator at all.
    #[error("locator not supported: {0}")]
    Unsupported(String),

    #[error("network error: {0}")]
    Network(String),

    /// No asset matched the requested mode/quality.
    #[error("no matching stream: {0}")]
    NoMatchingStream(String),

    /// The attempt exceeded its wall-clock budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// External tool exited unsuccessfully.
    #[error("tool failed: {0}")]
    Tool(String),

    /// The strategy observed the job's cancellation flag mid-flight.
    #[error("canceled")]
    Canceled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StrategyError {
    /// Transient failures earn one retry with a short fixed backoff
    /// before the chain moves on; everything else fails the strategy
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// One concrete acquisition implementation, tried in priority order.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name used in logs and attempt records.
    fn name(&self) -> &str;

    /// Metadata-only classification of the locator.
    async fn probe(&self, locator: &str) -> Result<ProbeReport, StrategyError>;

    /// Acquire the resource described by `request`, streaming progress
    /// through `sink`. Implementations must never report 100 before
    /// the artifact actually exists.
    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Artifact, StrategyError>;
}
