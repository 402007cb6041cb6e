//! Core domain types for the cache-warming job engine.
//!
//! These types mirror the rows persisted by the task store; they carry no
//! behaviour beyond small state-machine helpers on the status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default per-job concurrency when a job does not specify one.
pub const DEFAULT_JOB_CONCURRENCY: u32 = 5;

/// Default process-wide worker pool size.
pub const DEFAULT_WORKER_COUNT: usize = 20;

/// Default retry limit for a task before it becomes terminally failed.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default job priority. Higher values claim ahead of lower ones.
pub const DEFAULT_JOB_PRIORITY: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether transitioning from `self` to `next` is a legal job-state-machine move.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// What a worker should do with a claimed task.
///
/// Every task fetched by a page path through the normal pipeline is
/// `Fetch`; the single seed task created by `start_job` for
/// `use_sitemap` jobs is `DiscoverSitemap`, which runs the Sitemap
/// Discoverer instead of warming a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Fetch,
    DiscoverSitemap,
}

impl TaskKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::DiscoverSitemap => "discover_sitemap",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(Self::Fetch),
            "discover_sitemap" => Some(Self::DiscoverSitemap),
            _ => None,
        }
    }
}

/// Reserved page path backing the sitemap-seed task. Contains a NUL byte so
/// it can never collide with a path discovered from a real URL.
pub const SITEMAP_SEED_PATH: &str = "\0sitemap-seed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Seed,
    Sitemap,
    Link,
    Manual,
}

impl SourceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Sitemap => "sitemap",
            Self::Link => "link",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seed" => Some(Self::Seed),
            "sitemap" => Some(Self::Sitemap),
            "link" => Some(Self::Link),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default = "default_true")]
    pub use_sitemap: bool,
    #[serde(default)]
    pub find_links: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub skip_if_cached: bool,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> u32 {
    DEFAULT_JOB_CONCURRENCY
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            use_sitemap: true,
            find_links: false,
            concurrency: DEFAULT_JOB_CONCURRENCY,
            max_pages: None,
            skip_if_cached: false,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub domain_id: Uuid,
    pub domain: String,
    pub status: JobStatus,
    pub options: JobOptions,
    /// Claim order tie-break: higher priority jobs are claimed first.
    pub priority: i32,
    pub source_type: SourceType,
    pub source_detail: Option<String>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub skipped_tasks: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// processed / total * 100, 0 when there are no tasks yet.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        let processed = self.completed_tasks + self.failed_tasks + self.skipped_tasks;
        (f64::from(processed) / f64::from(self.total_tasks)) * 100.0
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_tasks > 0
            && self.completed_tasks + self.failed_tasks + self.skipped_tasks >= self.total_tasks
    }

    #[must_use]
    pub fn at_max_pages(&self) -> bool {
        match self.options.max_pages {
            Some(max) => self.total_tasks >= max,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub response_time_ms: u32,
    pub status_code: u16,
    pub cache_status: Option<String>,
    pub content_type: Option<String>,
    pub second_response_time_ms: Option<u32>,
    pub second_cache_status: Option<String>,
    pub external_redirect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub job_id: Uuid,
    pub page_id: Uuid,
    pub url: String,
    pub status: TaskStatus,
    pub kind: TaskKind,
    pub retry_count: u32,
    pub source_type: SourceType,
    pub source_url: Option<String>,
    pub response_time_ms: Option<u32>,
    pub status_code: Option<u16>,
    pub cache_status: Option<String>,
    pub content_type: Option<String>,
    pub second_response_time_ms: Option<u32>,
    pub second_cache_status: Option<String>,
    pub external_redirect: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub daily_page_limit: u32,
}

impl Plan {
    #[must_use]
    pub fn free() -> Self {
        Self {
            name: "free".to_string(),
            daily_page_limit: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn progress_is_zero_with_no_tasks() {
        let job = Job {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            domain_id: Uuid::new_v4(),
            domain: "example.test".into(),
            status: JobStatus::Pending,
            options: JobOptions::default(),
            priority: 0,
            source_type: SourceType::Manual,
            source_detail: None,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        assert_eq!(job.progress(), 0.0);
        assert!(!job.is_complete());
    }
}
