//! Blue Banded Bee cache-warming job engine: a durable task queue, a
//! worker pool that drains it, and the discovery pipeline (sitemap +
//! link extraction) that keeps it fed.

pub mod config;
pub mod discover;
pub mod domain;
pub mod engine;
pub mod fetch;
pub mod http;
pub mod job_manager;
pub mod pool;
pub mod scheduler;
pub mod store;
pub mod usage;

pub use config::AppConfig;
pub use domain::{Job, JobOptions, JobStatus, Task, TaskStatus};
pub use engine::{AppError, FetchError, StoreError};
pub use fetch::Fetcher;
pub use job_manager::JobManager;
pub use pool::{DispatchOutcome, WorkerPool};
pub use scheduler::SchedulerLoop;
pub use store::{SqliteTaskStore, TaskStore};
pub use usage::UsageAccountant;
