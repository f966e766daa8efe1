//! Priority-ordered strategy chain with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::fetcher::{
    Artifact, AttemptRecord, CancelFlag, FetchError, FetchRequest, Fetcher, ProbeReport,
    ProgressSink,
};

use super::{Strategy, StrategyError};

/// Hard cap on attempts per strategy; the first attempt plus retries
/// for transient failures.
pub const MAX_ATTEMPTS_PER_STRATEGY: u32 = 3;

/// Wall-clock budgets and backoff for chain execution.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Budget for one metadata probe attempt.
    pub probe_timeout: Duration,
    /// Budget for one full fetch attempt.
    pub fetch_timeout: Duration,
    /// Fixed pause before retrying a transient failure.
    pub retry_backoff: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(45),
            fetch_timeout: Duration::from_secs(600),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Ordered list of acquisition strategies tried until one succeeds.
///
/// Failure isolation: any failure of one strategy (library
/// incompatibility, network error, no matching stream, timeout) only
/// moves the chain to the next strategy. The chain reports exhaustion
/// only once every strategy has failed, surfacing the last failure and
/// retaining a reason record per attempt.
pub struct StrategyChain {
    strategies: Vec<Arc<dyn Strategy>>,
    config: ChainConfig,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>, config: ChainConfig) -> Self {
        Self { strategies, config }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    async fn probe_once(
        &self,
        strategy: &Arc<dyn Strategy>,
        locator: &str,
    ) -> Result<ProbeReport, StrategyError> {
        match timeout(self.config.probe_timeout, strategy.probe(locator)).await {
            Ok(result) => result,
            Err(_) => Err(StrategyError::Timeout(self.config.probe_timeout)),
        }
    }

    async fn fetch_once(
        &self,
        strategy: &Arc<dyn Strategy>,
        request: &FetchRequest,
        sink: ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Artifact, StrategyError> {
        match timeout(self.config.fetch_timeout, strategy.fetch(request, sink, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(StrategyError::Timeout(self.config.fetch_timeout)),
        }
    }
}

#[async_trait]
impl Fetcher for StrategyChain {
    async fn probe(&self, locator: &str, cancel: &CancelFlag) -> Result<ProbeReport, FetchError> {
        let mut last_reason = String::from("no strategies configured");

        for strategy in &self.strategies {
            if cancel.is_canceled() {
                return Err(FetchError::Canceled);
            }
            match self.probe_once(strategy, locator).await {
                Ok(report) => {
                    debug!(strategy = strategy.name(), locator, kind = ?report.kind, "Probe succeeded");
                    return Ok(report);
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), locator, error = %err, "Probe failed, trying next strategy");
                    last_reason = format!("{}: {err}", strategy.name());
                }
            }
        }

        Err(FetchError::MetadataUnavailable { detail: last_reason })
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Artifact, FetchError> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for strategy in &self.strategies {
            for attempt in 1..=MAX_ATTEMPTS_PER_STRATEGY {
                if cancel.is_canceled() {
                    return Err(FetchError::Canceled);
                }

                match self
                    .fetch_once(strategy, request, Arc::clone(&sink), cancel)
                    .await
                {
                    Ok(artifact) => {
                        debug!(
                            strategy = strategy.name(),
                            attempt,
                            path = %artifact.path.display(),
                            "Fetch succeeded"
                        );
                        return Ok(artifact);
                    }
                    Err(StrategyError::Canceled) => return Err(FetchError::Canceled),
                    Err(err) => {
                        warn!(
                            strategy = strategy.name(),
                            attempt,
                            locator = %request.locator,
                            error = %err,
                            "Fetch attempt failed"
                        );
                        let transient = err.is_transient();
                        attempts.push(AttemptRecord {
                            strategy: strategy.name().to_string(),
                            attempt,
                            reason: err.to_string(),
                        });
                        // Only transient failures earn another attempt
                        // on the same strategy.
                        if !transient || attempt == MAX_ATTEMPTS_PER_STRATEGY {
                            break;
                        }
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }

        let detail = attempts
            .last()
            .map(|a| format!("{}: {}", a.strategy, a.reason))
            .unwrap_or_else(|| "no strategies configured".to_string());
        Err(FetchError::Exhausted { detail, attempts })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::fetcher::null_progress_sink;
    use crate::job::{MediaMode, QualityHint};

    /// Scripted strategy: fails `failures` times with the given error
    /// kind, then succeeds. Records every invocation in `calls`.
    struct Scripted {
        name: String,
        failures: u32,
        transient: bool,
        invocations: AtomicU32,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(name: &str, failures: u32, transient: bool, calls: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                failures,
                transient,
                invocations: AtomicU32::new(0),
                calls,
            })
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn probe(&self, _locator: &str) -> Result<ProbeReport, StrategyError> {
            Err(StrategyError::Unsupported("probe unscripted".into()))
        }

        async fn fetch(
            &self,
            _request: &FetchRequest,
            sink: ProgressSink,
            _cancel: &CancelFlag,
        ) -> Result<Artifact, StrategyError> {
            let n = self.invocations.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(self.name.clone());
            if n < self.failures {
                if self.transient {
                    Err(StrategyError::Network("connection reset".into()))
                } else {
                    Err(StrategyError::NoMatchingStream("nothing suitable".into()))
                }
            } else {
                sink(100);
                Ok(Artifact { path: PathBuf::from("/tmp/out.mp4"), file_size: Some(1) })
            }
        }
    }

    fn request() -> FetchRequest {
        FetchRequest {
            locator: "https://example.com/watch?v=abc".to_string(),
            mode: MediaMode::Video,
            quality: QualityHint::Highest,
            title: "clip".to_string(),
        }
    }

    fn test_config() -> ChainConfig {
        ChainConfig {
            probe_timeout: Duration::from_millis(200),
            fetch_timeout: Duration::from_millis(200),
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits_the_chain() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = StrategyChain::new(
            vec![
                Scripted::new("primary", 0, false, Arc::clone(&calls)),
                Scripted::new("secondary", 0, false, Arc::clone(&calls)),
            ],
            test_config(),
        );

        let artifact = chain
            .fetch(&request(), null_progress_sink(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(artifact.path, PathBuf::from("/tmp/out.mp4"));
        assert_eq!(*calls.lock().unwrap(), vec!["primary".to_string()]);
    }

    // Every strategy gets its turn, in priority order, before
    // exhaustion is reported.
    #[tokio::test]
    async fn exhaustion_only_after_every_strategy_and_retry() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = StrategyChain::new(
            vec![
                Scripted::new("one", u32::MAX, true, Arc::clone(&calls)),
                Scripted::new("two", u32::MAX, false, Arc::clone(&calls)),
                Scripted::new("three", u32::MAX, true, Arc::clone(&calls)),
            ],
            test_config(),
        );

        let err = chain
            .fetch(&request(), null_progress_sink(), &CancelFlag::new())
            .await
            .unwrap_err();

        let FetchError::Exhausted { detail, attempts } = err else {
            panic!("expected exhaustion");
        };
        // Transient strategies get 3 attempts, permanent ones a single shot.
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["one", "one", "one", "two", "three", "three", "three"]
        );
        assert_eq!(attempts.len(), 7);
        assert!(detail.starts_with("three:"), "{detail}");
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_attempt_budget() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = StrategyChain::new(
            vec![Scripted::new("flaky", 2, true, Arc::clone(&calls))],
            test_config(),
        );

        chain
            .fetch(&request(), null_progress_sink(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_moves_on_without_retry() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = StrategyChain::new(
            vec![
                Scripted::new("broken", u32::MAX, false, Arc::clone(&calls)),
                Scripted::new("good", 0, false, Arc::clone(&calls)),
            ],
            test_config(),
        );

        chain
            .fetch(&request(), null_progress_sink(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["broken", "good"]);
    }

    #[tokio::test]
    async fn cancellation_prevents_any_new_attempt() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = StrategyChain::new(
            vec![Scripted::new("slow", 0, false, Arc::clone(&calls))],
            test_config(),
        );

        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = chain
            .fetch(&request(), null_progress_sink(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Canceled));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_exhaustion_reports_metadata_unavailable() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = StrategyChain::new(
            vec![Scripted::new("only", 0, false, calls)],
            test_config(),
        );

        let err = chain
            .probe("https://example.com/watch?v=abc", &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MetadataUnavailable { .. }));
    }
}
