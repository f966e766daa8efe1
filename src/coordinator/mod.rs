//! Job coordination: the orchestration layer between the HTTP surface
//! and the acquisition machinery.
//!
//! The [`Coordinator`] owns the in-memory [`JobRegistry`], the durable
//! [`HistoryLog`] and a single [`Fetcher`]. Submission validates the
//! locator, records a `queued` job and spawns a detached execution
//! unit; everything after that point is observable only through the
//! registry. Collection locators fan out into child jobs driven
//! through a bounded-concurrency pool.
//!
//! Cancellation is cooperative: `cancel` flips the job's status right
//! away and raises a [`CancelFlag`] that the execution unit observes
//! at its next checkpoint. In-flight transfers are not preempted.

mod locator;
mod run;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DownloadConfig;
use crate::fetcher::{CancelFlag, Fetcher};
use crate::history::{HistoryEntry, HistoryError, HistoryLog};
use crate::job::{Job, JobStatus, MediaMode, QualityHint};
use crate::observability::Metrics;
use crate::registry::{JobRegistry, RegistryError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unsupported locator: {0}")]
    InvalidLocator(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job id collision: {0}")]
    IdConflict(String),

    #[error("history storage failure: {0}")]
    Storage(#[from] HistoryError),
}

impl From<RegistryError> for CoordinatorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => Self::NotFound(id),
            RegistryError::DuplicateId(id) => Self::IdConflict(id),
        }
    }
}

/// Orchestrates job execution over a registry, a history log and one
/// fetcher. Shared as `Arc<Coordinator>`; spawned execution units hold
/// their own clone.
pub struct Coordinator {
    download: DownloadConfig,
    registry: JobRegistry,
    history: HistoryLog,
    fetcher: Arc<dyn Fetcher>,
    cancels: RwLock<HashMap<String, CancelFlag>>,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    pub fn new(
        download: DownloadConfig,
        history: HistoryLog,
        fetcher: Arc<dyn Fetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            download,
            registry: JobRegistry::new(),
            history,
            fetcher,
            cancels: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download.dir
    }

    /// Accept a new job. The locator is validated synchronously; all
    /// acquisition work happens in a detached task and is observed via
    /// [`Coordinator::job`].
    pub async fn submit(
        self: &Arc<Self>,
        locator: &str,
        mode: MediaMode,
        quality: QualityHint,
    ) -> Result<Job, CoordinatorError> {
        let locator = locator.trim();
        if !locator::is_supported(locator) {
            return Err(CoordinatorError::InvalidLocator(locator.to_string()));
        }

        let id = Uuid::now_v7().to_string();
        let job = Job::new(id.clone(), locator, mode, quality);
        let snapshot = job.clone();

        self.registry.create(job).await?;
        self.cancels
            .write()
            .await
            .insert(id.clone(), CancelFlag::new());
        self.metrics.job_submitted();
        info!(job_id = %id, locator, "Job accepted");

        tokio::spawn(Arc::clone(self).run_job(id));
        Ok(snapshot)
    }

    /// Current snapshot of one job.
    pub async fn job(&self, id: &str) -> Result<Job, CoordinatorError> {
        Ok(self.registry.get(id).await?)
    }

    /// Snapshot of every known job, parents and children alike.
    pub async fn jobs(&self) -> Vec<Job> {
        self.registry.list().await
    }

    /// Request cancellation. The status flips immediately; in-flight
    /// strategy attempts stop at their next checkpoint. Canceling a
    /// job that already reached a terminal state is a no-op and
    /// returns the unchanged snapshot.
    pub async fn cancel(&self, id: &str) -> Result<Job, CoordinatorError> {
        let job = self.registry.get(id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        self.raise_flag(id).await;
        for child_id in &job.children {
            self.raise_flag(child_id).await;
            self.apply(child_id, |child| {
                child.try_transition(JobStatus::Canceled);
            })
            .await;
        }

        let updated = self
            .registry
            .update(id, |job| {
                job.try_transition(JobStatus::Canceled);
            })
            .await?;
        self.metrics.job_canceled();
        info!(job_id = %id, "Job canceled");
        Ok(updated)
    }

    /// Remove a job record (and, for collections, its children). A
    /// running job is canceled first; artifacts already on disk are
    /// removed best-effort.
    pub async fn delete(&self, id: &str) -> Result<Job, CoordinatorError> {
        let job = self.registry.get(id).await?;

        self.raise_flag(id).await;
        for child_id in &job.children {
            self.raise_flag(child_id).await;
            if let Ok(child) = self.registry.delete(child_id).await {
                remove_artifact(child.result_path.as_deref());
            }
            self.cancels.write().await.remove(child_id);
        }

        let deleted = self.registry.delete(id).await?;
        self.cancels.write().await.remove(id);
        remove_artifact(deleted.result_path.as_deref());
        info!(job_id = %id, "Job deleted");
        Ok(deleted)
    }

    /// Snapshot of the durable download history, oldest first.
    pub async fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history.entries().await
    }

    /// Truncate the durable download history.
    pub async fn clear_history(&self) -> Result<(), CoordinatorError> {
        self.history.clear().await?;
        Ok(())
    }

    async fn raise_flag(&self, id: &str) {
        if let Some(flag) = self.cancels.read().await.get(id) {
            flag.cancel();
        }
    }

    async fn cancel_flag(&self, id: &str) -> Option<CancelFlag> {
        self.cancels.read().await.get(id).cloned()
    }

    /// Registry mutation that tolerates the job having been deleted
    /// mid-run; late writes from a detached execution unit are dropped.
    async fn apply<F>(&self, id: &str, mutate: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        match self.registry.update(id, mutate).await {
            Ok(job) => Some(job),
            Err(RegistryError::NotFound(_)) => None,
            Err(err) => {
                warn!(job_id = %id, error = %err, "Registry update failed");
                None
            }
        }
    }
}

fn remove_artifact(path: Option<&Path>) {
    let Some(path) = path else { return };
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "Failed to remove artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{Artifact, FetchError, FetchRequest, ProbeReport, ProgressSink};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Probe classifies everything as a single item; fetch succeeds
    /// after an optional pause, writing nothing to disk.
    struct StubFetcher {
        pause: Duration,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn probe(&self, _: &str, _: &CancelFlag) -> Result<ProbeReport, FetchError> {
            Ok(ProbeReport::single("Stub Item"))
        }

        async fn fetch(
            &self,
            request: &FetchRequest,
            sink: ProgressSink,
            cancel: &CancelFlag,
        ) -> Result<Artifact, FetchError> {
            tokio::time::sleep(self.pause).await;
            if cancel.is_canceled() {
                return Err(FetchError::Canceled);
            }
            sink(50);
            Ok(Artifact {
                path: format!("{}.mp4", request.title).into(),
                file_size: Some(2048),
            })
        }
    }

    fn coordinator(dir: &TempDir, pause: Duration) -> Arc<Coordinator> {
        let download = DownloadConfig {
            dir: dir.path().to_path_buf(),
            ..DownloadConfig::default()
        };
        let history = HistoryLog::open(dir.path().join("history.json"));
        Arc::new(Coordinator::new(
            download,
            history,
            Arc::new(StubFetcher { pause }),
            Arc::new(Metrics::new()),
        ))
    }

    async fn wait_for_terminal(coordinator: &Coordinator, id: &str) -> Job {
        for _ in 0..200 {
            let job = coordinator.job(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_locator() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, Duration::ZERO);

        let result = coordinator
            .submit("https://example.com/page.html", MediaMode::Video, QualityHint::Highest)
            .await;
        assert!(matches!(result, Err(CoordinatorError::InvalidLocator(_))));
        assert!(coordinator.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, Duration::ZERO);

        let job = coordinator
            .submit(
                "https://www.youtube.com/watch?v=abc123",
                MediaMode::Audio,
                QualityHint::Highest,
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let done = wait_for_terminal(&coordinator, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.title.as_deref(), Some("Stub Item"));
        assert!(done.result_path.is_some());

        let history = coordinator.history_entries().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, job.id);
        assert_eq!(history[0].file_size.as_deref(), Some("2KB"));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_jobs() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, Duration::ZERO);

        let job = coordinator
            .submit(
                "https://youtu.be/abc123",
                MediaMode::Video,
                QualityHint::Highest,
            )
            .await
            .unwrap();
        let done = wait_for_terminal(&coordinator, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);

        let after = coordinator.cancel(&job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_stops_a_running_job() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, Duration::from_secs(5));

        let job = coordinator
            .submit(
                "https://youtu.be/abc123",
                MediaMode::Video,
                QualityHint::Highest,
            )
            .await
            .unwrap();
        // Let the execution unit reach the fetch pause.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let canceled = coordinator.cancel(&job.id).await.unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);

        let done = wait_for_terminal(&coordinator, &job.id).await;
        assert_eq!(done.status, JobStatus::Canceled);
        assert!(done.result_path.is_none());
        assert!(coordinator.history_entries().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_flags_do_not_outlive_their_jobs() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, Duration::ZERO);

        let job = coordinator
            .submit(
                "https://youtu.be/abc123",
                MediaMode::Video,
                QualityHint::Highest,
            )
            .await
            .unwrap();
        wait_for_terminal(&coordinator, &job.id).await;

        // Flags are only ever inserted for jobs the registry accepted
        // and are pruned once the execution unit finishes.
        for _ in 0..200 {
            if coordinator.cancels.read().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cancel flag for job {} was never pruned", job.id);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, Duration::ZERO);

        let job = coordinator
            .submit(
                "https://youtu.be/abc123",
                MediaMode::Video,
                QualityHint::Highest,
            )
            .await
            .unwrap();
        wait_for_terminal(&coordinator, &job.id).await;

        coordinator.delete(&job.id).await.unwrap();
        assert!(matches!(
            coordinator.job(&job.id).await,
            Err(CoordinatorError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.delete(&job.id).await,
            Err(CoordinatorError::NotFound(_))
        ));
    }
}
