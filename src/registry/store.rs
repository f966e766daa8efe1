use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::job::Job;

use super::{RegistryError, Result};

/// Concurrent key-value store of live [`Job`] records keyed by job id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job. The id must be pre-populated and unique.
    pub async fn create(&self, job: Job) -> Result<String> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(RegistryError::DuplicateId(job.id.clone()));
        }
        let id = job.id.clone();
        debug!(job_id = %id, locator = %job.locator, "Job registered");
        jobs.insert(id.clone(), job);
        Ok(id)
    }

    /// Snapshot of a single job.
    pub async fn get(&self, id: &str) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Apply an atomic partial update and return the resulting snapshot.
    ///
    /// The mutator runs under the write lock, so concurrent `update`
    /// and `delete` calls on the same id are serialized.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        mutate(job);
        Ok(job.clone())
    }

    /// Remove a job, returning the final record.
    pub async fn delete(&self, id: &str) -> Result<Job> {
        self.jobs
            .write()
            .await
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Snapshot of every live job. Insertion order is not meaningful
    /// to callers.
    pub async fn list(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::job::{JobStatus, MediaMode, QualityHint};

    fn sample_job(id: &str) -> Job {
        Job::new(id, "https://example.com/watch?v=abc", MediaMode::Video, QualityHint::Highest)
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let registry = JobRegistry::new();
        registry.create(sample_job("job-1")).await.unwrap();

        let err = registry.create(sample_job("job-1")).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn get_and_delete_report_missing_jobs() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.get("nope").await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            registry.delete("nope").await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            registry.update("nope", |_| {}).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn update_returns_the_mutated_snapshot() {
        let registry = JobRegistry::new();
        registry.create(sample_job("job-1")).await.unwrap();

        let updated = registry
            .update("job-1", |job| {
                assert!(job.try_transition(JobStatus::Resolving));
                job.observe_progress(5);
            })
            .await
            .unwrap();

        assert_eq!(updated.status, JobStatus::Resolving);
        assert_eq!(updated.progress, 5);
    }

    // Concurrent updates each setting a distinct field must never
    // drop a field.
    #[tokio::test]
    async fn concurrent_updates_with_disjoint_fields_all_land() {
        let registry = Arc::new(JobRegistry::new());
        registry.create(sample_job("job-1")).await.unwrap();

        let mut handles = Vec::new();
        for field in 0..4u8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .update("job-1", move |job| match field {
                        0 => job.title = Some("a title".to_string()),
                        1 => job.observe_progress(42),
                        2 => job.children.push("child-1".to_string()),
                        _ => job.error_detail = Some("detail".to_string()),
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let job = registry.get("job-1").await.unwrap();
        assert_eq!(job.title.as_deref(), Some("a title"));
        assert_eq!(job.progress, 42);
        assert_eq!(job.children, vec!["child-1".to_string()]);
        assert_eq!(job.error_detail.as_deref(), Some("detail"));
    }

    #[tokio::test]
    async fn concurrent_progress_updates_never_regress() {
        let registry = Arc::new(JobRegistry::new());
        registry.create(sample_job("job-1")).await.unwrap();

        let mut handles = Vec::new();
        for percent in [10u8, 90, 30, 70, 50] {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .update("job-1", move |job| job.observe_progress(percent))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.get("job-1").await.unwrap().progress, 90);
    }

    #[tokio::test]
    async fn list_snapshots_every_job() {
        let registry = JobRegistry::new();
        registry.create(sample_job("a")).await.unwrap();
        registry.create(sample_job("b")).await.unwrap();

        let mut ids: Vec<String> = registry.list().await.into_iter().map(|j| j.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
