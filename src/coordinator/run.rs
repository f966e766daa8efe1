//! Detached execution units for submitted jobs.
//!
//! One task per submitted job: resolve the locator, then either fetch
//! a single item or fan a collection out into child jobs behind a
//! bounded semaphore. All registry writes go through
//! `Coordinator::apply`, which drops late writes for deleted jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::fetcher::{CancelFlag, FetchError, FetchRequest, ProgressSink};
use crate::history::{HistoryEntry, HistoryOutcome};
use crate::humanize::ByteSize;
use crate::job::{Job, JobKind, JobStatus, sanitize_title};

use super::Coordinator;

impl Coordinator {
    pub(super) async fn run_job(self: Arc<Self>, id: String) {
        let Some(flag) = self.cancel_flag(&id).await else {
            // Deleted before the task got scheduled.
            return;
        };

        let resolving = self
            .apply(&id, |job| {
                job.try_transition(JobStatus::Resolving);
            })
            .await;
        let Some(job) = resolving else { return };
        if job.status != JobStatus::Resolving {
            self.prune_flags(&[id]).await;
            return;
        }

        info!(job_id = %id, locator = %job.locator, "Resolving locator");
        match self.fetcher.probe(&job.locator, &flag).await {
            Ok(report) => {
                let classified = self
                    .apply(&id, |job| {
                        job.kind = report.kind;
                        job.title = Some(report.title.clone());
                    })
                    .await;
                if let Some(job) = classified {
                    match report.kind {
                        JobKind::Single => self.run_single(job, flag).await,
                        JobKind::Collection => {
                            self.run_collection(job, report.items, flag).await;
                        }
                    }
                }
            }
            Err(FetchError::Canceled) => self.mark_canceled(&id).await,
            Err(err) => self.fail_job(&id, err.to_string()).await,
        }

        self.prune_flags(&[id]).await;
    }

    /// Drive one item through `downloading` to a terminal state. Used
    /// for root single-item jobs and for collection children alike.
    pub(super) async fn run_single(self: &Arc<Self>, job: Job, flag: CancelFlag) {
        let id = job.id.clone();
        let started = self
            .apply(&id, |job| {
                job.try_transition(JobStatus::Downloading);
            })
            .await;
        match started {
            Some(job) if job.status == JobStatus::Downloading => {}
            // Canceled won the race, or the record was deleted.
            _ => return,
        }

        let request = FetchRequest {
            locator: job.locator.clone(),
            mode: job.mode,
            quality: job.quality.clone(),
            title: sanitize_title(job.title.as_deref().unwrap_or(&job.locator)),
        };
        let sink = self.progress_sink_for(&id);

        match self.fetcher.fetch(&request, sink, &flag).await {
            Ok(artifact) => {
                let file_size = artifact.file_size.map(|b| ByteSize(b).to_human_readable());
                let completed = self
                    .apply(&id, |job| {
                        if job.try_transition(JobStatus::Completed) {
                            job.result_path = Some(artifact.path.clone());
                            job.observe_progress(100);
                        }
                    })
                    .await;
                if let Some(job) = completed {
                    if job.status == JobStatus::Completed {
                        self.metrics.job_completed();
                        info!(job_id = %id, path = %artifact.path.display(), "Job completed");
                        if job.parent_id.is_none() {
                            self.record_history(single_entry(&job, file_size)).await;
                        }
                    }
                }
            }
            Err(FetchError::Canceled) => self.mark_canceled(&id).await,
            Err(err) => self.fail_job(&id, err.to_string()).await,
        }
    }

    /// Fan a collection out into child jobs. At most
    /// `max_concurrent_children` children are in flight at once;
    /// dispatch order follows provider order.
    async fn run_collection(self: &Arc<Self>, parent: Job, items: Vec<String>, flag: CancelFlag) {
        let parent_id = parent.id.clone();
        if items.is_empty() {
            self.fail_job(&parent_id, "collection resolved to no items".to_string())
                .await;
            return;
        }

        let mut child_ids = Vec::with_capacity(items.len());
        for locator in &items {
            let child = Job::new_child(Uuid::now_v7().to_string(), locator, &parent);
            let child_id = child.id.clone();
            if let Err(err) = self.registry.create(child).await {
                warn!(job_id = %child_id, error = %err, "Failed to register child job");
                continue;
            }
            self.cancels
                .write()
                .await
                .insert(child_id.clone(), CancelFlag::new());
            child_ids.push(child_id);
        }

        let downloading = self
            .apply(&parent_id, |job| {
                job.children = child_ids.clone();
                job.try_transition(JobStatus::Downloading);
            })
            .await;
        match downloading {
            Some(job) if job.status == JobStatus::Downloading => {}
            _ => {
                for child_id in &child_ids {
                    self.mark_canceled(child_id).await;
                }
                self.prune_flags(&child_ids).await;
                return;
            }
        }
        info!(job_id = %parent_id, items = child_ids.len(), "Collection fan-out started");

        let semaphore = Arc::new(Semaphore::new(self.download.max_concurrent_children));
        let total = child_ids.len();
        let finished = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for child_id in child_ids.clone() {
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let finished = Arc::clone(&finished);
            let parent_flag = flag.clone();
            let parent_id = parent_id.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let child_flag = this.cancel_flag(&child_id).await.unwrap_or_default();
                if parent_flag.is_canceled() || child_flag.is_canceled() {
                    // No new work once cancellation was observed.
                    this.mark_canceled(&child_id).await;
                } else {
                    this.run_child(&child_id, child_flag).await;
                }

                // Only completed and errored children advance the
                // aggregate, so it reaches 100 exactly when every
                // child settled (canceled runs take the parent with
                // them instead).
                let settled = matches!(
                    this.registry.get(&child_id).await.map(|c| c.status),
                    Ok(JobStatus::Completed | JobStatus::Error)
                );
                if settled {
                    let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                    let percent = (done * 100 / total) as u8;
                    this.apply(&parent_id, |job| job.observe_progress(percent))
                        .await;
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        let mut completed = 0usize;
        for child_id in &child_ids {
            if let Ok(child) = self.registry.get(child_id).await {
                if child.status == JobStatus::Completed {
                    completed += 1;
                }
            }
        }
        let failed = total - completed;

        if flag.is_canceled() {
            self.mark_canceled(&parent_id).await;
        } else if completed > 0 {
            let done = self
                .apply(&parent_id, |job| {
                    if job.try_transition(JobStatus::Completed) {
                        job.observe_progress(100);
                    }
                })
                .await;
            if let Some(job) = done {
                if job.status == JobStatus::Completed {
                    self.metrics.job_completed();
                    info!(job_id = %parent_id, completed, failed, "Collection completed");
                    self.record_history(collection_entry(&job, completed, failed)).await;
                }
            }
        } else {
            self.fail_job(
                &parent_id,
                format!("all {total} collection items failed"),
            )
            .await;
        }

        self.prune_flags(&child_ids).await;
    }

    /// Drive one collection child through its full lifecycle. Children
    /// probe their own locator (for the display title) but are always
    /// treated as single items; nested collections do not fan out
    /// further.
    async fn run_child(self: &Arc<Self>, id: &str, flag: CancelFlag) {
        let resolving = self
            .apply(id, |job| {
                job.try_transition(JobStatus::Resolving);
            })
            .await;
        let Some(job) = resolving else { return };
        if job.status != JobStatus::Resolving {
            return;
        }

        match self.fetcher.probe(&job.locator, &flag).await {
            Ok(report) => {
                let classified = self
                    .apply(id, |job| {
                        job.title = Some(report.title.clone());
                    })
                    .await;
                if let Some(job) = classified {
                    self.run_single(job, flag).await;
                }
            }
            Err(FetchError::Canceled) => self.mark_canceled(id).await,
            Err(err) => self.fail_job(id, err.to_string()).await,
        }
    }

    /// Progress callback wired to the registry. Updates are clamped to
    /// 99 here; only the completion transition writes 100.
    fn progress_sink_for(self: &Arc<Self>, id: &str) -> ProgressSink {
        let this = Arc::clone(self);
        let id = id.to_string();
        Arc::new(move |percent| {
            let this = Arc::clone(&this);
            let id = id.clone();
            tokio::spawn(async move {
                this.apply(&id, |job| job.observe_progress(percent.min(99)))
                    .await;
            });
        })
    }

    async fn fail_job(&self, id: &str, detail: String) {
        let failed = self
            .apply(id, |job| {
                if job.try_transition(JobStatus::Error) {
                    job.error_detail = Some(detail.clone());
                }
            })
            .await;
        if let Some(job) = failed {
            if job.status == JobStatus::Error {
                self.metrics.job_failed();
                warn!(job_id = %id, detail = %detail, "Job failed");
            }
        }
    }

    async fn mark_canceled(&self, id: &str) {
        self.apply(id, |job| {
            job.try_transition(JobStatus::Canceled);
        })
        .await;
    }

    /// Append to the durable history. A storage failure is logged and
    /// counted; the job outcome already reached the registry and is
    /// not rolled back.
    async fn record_history(&self, entry: HistoryEntry) {
        if let Err(err) = self.history.append(entry).await {
            self.metrics.history_append_failed();
            error!(error = %err, "Failed to append history entry");
        }
    }

    async fn prune_flags(&self, ids: &[String]) {
        let mut cancels = self.cancels.write().await;
        for id in ids {
            cancels.remove(id);
        }
    }
}

fn single_entry(job: &Job, file_size: Option<String>) -> HistoryEntry {
    let result = job
        .result_path
        .as_deref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    HistoryEntry {
        id: job.id.clone(),
        locator: job.locator.clone(),
        title: job.title.clone().unwrap_or_else(|| job.locator.clone()),
        mode: job.mode,
        quality: job.quality.clone(),
        result,
        file_size,
        outcome: HistoryOutcome::Completed,
        recorded_at: chrono::Utc::now(),
    }
}

fn collection_entry(job: &Job, completed: usize, failed: usize) -> HistoryEntry {
    let total = completed + failed;
    let outcome = if failed == 0 {
        HistoryOutcome::Completed
    } else {
        HistoryOutcome::PartialSuccess {
            items_completed: completed,
            items_failed: failed,
        }
    };
    HistoryEntry {
        id: job.id.clone(),
        locator: job.locator.clone(),
        title: job.title.clone().unwrap_or_else(|| job.locator.clone()),
        mode: job.mode,
        quality: job.quality.clone(),
        result: format!("items: {completed}/{total}"),
        file_size: None,
        outcome,
        recorded_at: chrono::Utc::now(),
    }
}
