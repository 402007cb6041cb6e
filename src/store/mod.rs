//! Durable Task Store: the single source of truth for jobs, pages, and
//! tasks. Exposed as a trait so the job manager and worker pool can be unit
//! tested against an in-memory fake without a live database.

pub mod sqlite;

use crate::domain::{Job, JobOptions, JobStatus, SourceType, Task, TaskKind};
use crate::engine::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use sqlite::SqliteTaskStore;

#[derive(Debug, Clone)]
pub struct NewJob {
    pub organisation_id: Uuid,
    pub domain: String,
    pub options: JobOptions,
    pub priority: i32,
    pub source_type: SourceType,
    pub source_detail: Option<String>,
}

/// Outcome a worker records when a task attempt finishes.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(crate::domain::FetchOutcome),
    /// A `DiscoverSitemap` seed task finished: `pages_found` is recorded for
    /// observability, no fetch fields apply.
    Discovered { pages_found: u32 },
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<crate::domain::TaskStatus>,
    pub source_type: Option<SourceType>,
}

/// The store's complete operation surface, per the durable task store
/// design: every mutation here is one transaction.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    /// Insert `paths` as pages under `domain` and as tasks for `job_id`,
    /// deduplicating on `(domain, path)` and `(job_id, page_id)`. Returns
    /// the number of tasks actually inserted (idempotent: re-submitting the
    /// same set a second time returns 0). Silently truncates against the
    /// job's `max_pages` option.
    async fn enqueue_pages(
        &self,
        job_id: Uuid,
        paths: &[String],
        source_type: SourceType,
        source_url: Option<&str>,
    ) -> Result<u32, StoreError> {
        self.enqueue_tasks(job_id, paths, TaskKind::Fetch, source_type, source_url)
            .await
    }

    /// Same as [`TaskStore::enqueue_pages`] but lets the caller pick the
    /// task's [`TaskKind`] — used once, by `start_job`, to seed a
    /// `DiscoverSitemap` task rather than a normal fetch.
    async fn enqueue_tasks(
        &self,
        job_id: Uuid,
        paths: &[String],
        kind: TaskKind,
        source_type: SourceType,
        source_url: Option<&str>,
    ) -> Result<u32, StoreError>;

    /// Atomically claim one runnable task, optionally restricted to one job.
    async fn claim_next_task(
        &self,
        worker_id: &str,
        job_filter: Option<Uuid>,
    ) -> Result<Option<Task>, StoreError>;

    /// Record a terminal outcome for `task_id`. Idempotent: calling this
    /// twice with the same terminal status is a no-op on the second call.
    async fn complete_task(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), StoreError>;

    /// Reopen a task for retry: increments `retry_count`, clears
    /// `started_at`/`completed_at`, and returns it to `pending`. Fails if
    /// the task is already terminal. Does not itself check the job's
    /// `retry_limit` — the worker pool compares `retry_count` against it
    /// before deciding whether to reopen or fail a task outright.
    async fn reopen_task(&self, task_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Move any task stuck in `running` past `lease` back to `pending`.
    /// Returns the number reclaimed.
    async fn reclaim_expired_tasks(&self, lease: std::time::Duration) -> Result<u32, StoreError>;

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError>;

    async fn list_jobs(
        &self,
        organisation_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError>;

    async fn list_tasks(
        &self,
        job_id: Uuid,
        filter: TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, StoreError>;

    /// Count of tasks for `job_id` currently in `running` status.
    async fn in_flight_count(&self, job_id: Uuid) -> Result<u32, StoreError>;
}

#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
