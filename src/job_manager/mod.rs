//! Job Manager: owns the job state machine and the seed-task creation that
//! starts a job moving. Knows only about the store — never about workers —
//! per the no-cyclic-references design note.

use crate::domain::{Job, JobOptions, JobStatus, SourceType, TaskKind, SITEMAP_SEED_PATH};
use crate::engine::StoreError;
use crate::store::{NewJob, TaskStore};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Cooperative cancellation flags for running jobs, mirroring the
/// `Arc<DashMap<JobId, Arc<AtomicBool>>>` pattern used for job cancellation
/// elsewhere in this corpus.
pub struct JobManager {
    store: Arc<dyn TaskStore>,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
    /// Signalled whenever new work may be runnable, so the scheduler loop
    /// doesn't have to poll on a tight timer alone.
    pub work_available: Arc<Notify>,
}

impl JobManager {
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            cancel_flags: DashMap::new(),
            work_available: Arc::new(Notify::new()),
        }
    }

    pub async fn create_job(
        &self,
        organisation_id: Uuid,
        domain: String,
        options: JobOptions,
        priority: i32,
        source_type: SourceType,
        source_detail: Option<String>,
    ) -> Result<Job, StoreError> {
        self.store
            .create_job(NewJob {
                organisation_id,
                domain,
                options,
                priority,
                source_type,
                source_detail,
            })
            .await
    }

    /// Seed the job's first task: a sitemap-discovery task if
    /// `use_sitemap`, otherwise a single root-page task. Transitions the
    /// job `pending -> running`.
    pub async fn start_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        let job = self.store.get_job(job_id).await?;
        self.store.update_job_status(job_id, JobStatus::Running).await?;

        let (seed_path, kind) = if job.options.use_sitemap {
            (SITEMAP_SEED_PATH.to_string(), TaskKind::DiscoverSitemap)
        } else {
            ("/".to_string(), TaskKind::Fetch)
        };
        self.store
            .enqueue_tasks(job_id, &[seed_path], kind, SourceType::Seed, None)
            .await?;

        self.cancel_flags.insert(job_id, Arc::new(AtomicBool::new(false)));
        self.work_available.notify_waiters();
        Ok(())
    }

    /// Transition a job to `failed` following a fatal seed error (§7: the
    /// sitemap seed request errored on all attempts and `use_sitemap` was
    /// the job's sole discovery mode).
    pub async fn fail_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.store.update_job_status(job_id, JobStatus::Failed).await?;
        self.cancel_flags.remove(&job_id);
        Ok(())
    }

    /// Mark a job cancelled. Cooperative: in-flight tasks still complete
    /// and record their result, but the scheduler stops dispatching new
    /// tasks for this job and the job's status will not revert.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Cancelled,
            });
        }
        self.store.update_job_status(job_id, JobStatus::Cancelled).await?;
        if let Some(flag) = self.cancel_flags.get(&job_id) {
            flag.store(true, Ordering::Release);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_cancelled(&self, job_id: Uuid) -> bool {
        self.cancel_flags
            .get(&job_id)
            .is_some_and(|f| f.load(Ordering::Acquire))
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.store.get_job(job_id).await
    }

    /// Evaluate whether `job_id` should move to a terminal status: all
    /// tasks accounted for and none in flight.
    pub async fn evaluate_job_completion(&self, job_id: Uuid) -> Result<(), StoreError> {
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Running {
            return Ok(());
        }
        let in_flight = self.store.in_flight_count(job_id).await?;
        if in_flight == 0 && job.is_complete() {
            self.store.update_job_status(job_id, JobStatus::Completed).await?;
            self.cancel_flags.remove(&job_id);
        }
        Ok(())
    }
}
