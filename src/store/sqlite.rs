//! SQLite-backed `TaskStore`.
//!
//! Pool setup (WAL journal, normal synchronous mode, busy timeout) and the
//! chunked `IN (...)` batching below follow the same shape used elsewhere
//! in this codebase for a SQLite-backed index: schema as a const, idempotent
//! `CREATE TABLE IF NOT EXISTS`, and `ON CONFLICT` upserts rather than
//! read-then-write races.

use super::{NewJob, TaskFilter, TaskOutcome, TaskStore};
use crate::domain::{FetchOutcome, Job, JobOptions, JobStatus, SourceType, Task, TaskKind, TaskStatus};
use crate::engine::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS domains (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    domain_id TEXT NOT NULL REFERENCES domains(id),
    path TEXT NOT NULL,
    UNIQUE(domain_id, path)
);
CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain_id);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    organisation_id TEXT NOT NULL,
    domain_id TEXT NOT NULL REFERENCES domains(id),
    domain TEXT NOT NULL,
    status TEXT NOT NULL,
    use_sitemap INTEGER NOT NULL,
    find_links INTEGER NOT NULL,
    concurrency INTEGER NOT NULL,
    max_pages INTEGER,
    skip_if_cached INTEGER NOT NULL,
    retry_limit INTEGER NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    source_type TEXT NOT NULL,
    source_detail TEXT,
    total_tasks INTEGER NOT NULL DEFAULT 0,
    completed_tasks INTEGER NOT NULL DEFAULT 0,
    failed_tasks INTEGER NOT NULL DEFAULT 0,
    skipped_tasks INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_jobs_org ON jobs(organisation_id);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES jobs(id),
    page_id TEXT NOT NULL REFERENCES pages(id),
    status TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'fetch',
    retry_count INTEGER NOT NULL DEFAULT 0,
    source_type TEXT NOT NULL,
    source_url TEXT,
    response_time_ms INTEGER,
    status_code INTEGER,
    cache_status TEXT,
    content_type TEXT,
    second_response_time_ms INTEGER,
    second_cache_status TEXT,
    external_redirect INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    claimed_by TEXT,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    UNIQUE(job_id, page_id)
);
CREATE INDEX IF NOT EXISTS idx_tasks_job_status ON tasks(job_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_status_created ON tasks(status, created_at);
CREATE INDEX IF NOT EXISTS idx_tasks_running_started ON tasks(status, started_at);
"#;

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests — one connection, shared cache off, schema
    /// applied the same way as the on-disk variant.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("static in-memory DSN always parses");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    async fn get_or_create_domain(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        name: &str,
    ) -> Result<String, StoreError> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM domains WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;
        if let Some((id,)) = existing {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO domains (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(Utc::now().timestamp())
            .execute(&mut **tx)
            .await?;
        Ok(id)
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job, StoreError> {
        let status_str: String = row.try_get("status")?;
        let source_str: String = row.try_get("source_type")?;
        Ok(Job {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?).expect("stored uuid is valid"),
            organisation_id: Uuid::parse_str(&row.try_get::<String, _>("organisation_id")?)
                .expect("stored uuid is valid"),
            domain_id: Uuid::parse_str(&row.try_get::<String, _>("domain_id")?)
                .expect("stored uuid is valid"),
            domain: row.try_get("domain")?,
            status: JobStatus::parse(&status_str).expect("stored status is valid"),
            options: JobOptions {
                use_sitemap: row.try_get::<i64, _>("use_sitemap")? != 0,
                find_links: row.try_get::<i64, _>("find_links")? != 0,
                concurrency: row.try_get::<i64, _>("concurrency")? as u32,
                max_pages: row.try_get::<Option<i64>, _>("max_pages")?.map(|v| v as u32),
                skip_if_cached: row.try_get::<i64, _>("skip_if_cached")? != 0,
                retry_limit: row.try_get::<i64, _>("retry_limit")? as u32,
            },
            priority: row.try_get::<i64, _>("priority")? as i32,
            source_type: SourceType::parse(&source_str).expect("stored source_type is valid"),
            source_detail: row.try_get("source_detail")?,
            total_tasks: row.try_get::<i64, _>("total_tasks")? as u32,
            completed_tasks: row.try_get::<i64, _>("completed_tasks")? as u32,
            failed_tasks: row.try_get::<i64, _>("failed_tasks")? as u32,
            skipped_tasks: row.try_get::<i64, _>("skipped_tasks")? as u32,
            created_at: from_ts(row.try_get("created_at")?),
            started_at: row.try_get::<Option<i64>, _>("started_at")?.map(from_ts),
            completed_at: row.try_get::<Option<i64>, _>("completed_at")?.map(from_ts),
        })
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow, url: String) -> Result<Task, StoreError> {
        let status_str: String = row.try_get("status")?;
        let source_str: String = row.try_get("source_type")?;
        let kind_str: String = row.try_get("kind")?;
        Ok(Task {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?).expect("stored uuid is valid"),
            job_id: Uuid::parse_str(&row.try_get::<String, _>("job_id")?)
                .expect("stored uuid is valid"),
            page_id: Uuid::parse_str(&row.try_get::<String, _>("page_id")?)
                .expect("stored uuid is valid"),
            url,
            status: TaskStatus::parse(&status_str).expect("stored status is valid"),
            kind: TaskKind::parse(&kind_str).expect("stored kind is valid"),
            retry_count: row.try_get::<i64, _>("retry_count")? as u32,
            source_type: SourceType::parse(&source_str).expect("stored source_type is valid"),
            source_url: row.try_get("source_url")?,
            response_time_ms: row
                .try_get::<Option<i64>, _>("response_time_ms")?
                .map(|v| v as u32),
            status_code: row
                .try_get::<Option<i64>, _>("status_code")?
                .map(|v| v as u16),
            cache_status: row.try_get("cache_status")?,
            content_type: row.try_get("content_type")?,
            second_response_time_ms: row
                .try_get::<Option<i64>, _>("second_response_time_ms")?
                .map(|v| v as u32),
            second_cache_status: row.try_get("second_cache_status")?,
            external_redirect: row.try_get::<i64, _>("external_redirect")? != 0,
            error: row.try_get("error")?,
            created_at: from_ts(row.try_get("created_at")?),
            started_at: row.try_get::<Option<i64>, _>("started_at")?.map(from_ts),
            completed_at: row.try_get::<Option<i64>, _>("completed_at")?.map(from_ts),
        })
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

const TASK_COLUMNS: &str = "t.id, t.job_id, t.page_id, t.status, t.kind, t.retry_count, t.source_type, \
    t.source_url, t.response_time_ms, t.status_code, t.cache_status, t.content_type, \
    t.second_response_time_ms, t.second_cache_status, t.external_redirect, t.error, \
    t.created_at, t.started_at, t.completed_at, d.name AS domain_name, p.path AS page_path";

fn task_url(row: &sqlx::sqlite::SqliteRow) -> Result<String, StoreError> {
    let domain: String = row.try_get("domain_name")?;
    let path: String = row.try_get("page_path")?;
    if path == crate::domain::SITEMAP_SEED_PATH {
        return Ok(format!("https://{domain}/sitemap.xml"));
    }
    Ok(format!("https://{domain}{path}"))
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        let domain_id = Self::get_or_create_domain(&mut tx, &new_job.domain).await?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        sqlx::query(
            r"INSERT INTO jobs (
                id, organisation_id, domain_id, domain, status, use_sitemap, find_links,
                concurrency, max_pages, skip_if_cached, retry_limit, priority, source_type, source_detail,
                total_tasks, completed_tasks, failed_tasks, skipped_tasks, created_at
            ) VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?)",
        )
        .bind(&id)
        .bind(new_job.organisation_id.to_string())
        .bind(&domain_id)
        .bind(&new_job.domain)
        .bind(i64::from(new_job.options.use_sitemap))
        .bind(i64::from(new_job.options.find_links))
        .bind(i64::from(new_job.options.concurrency))
        .bind(new_job.options.max_pages.map(i64::from))
        .bind(i64::from(new_job.options.skip_if_cached))
        .bind(i64::from(new_job.options.retry_limit))
        .bind(i64::from(new_job.priority))
        .bind(new_job.source_type.as_str())
        .bind(&new_job.source_detail)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_job(Uuid::parse_str(&id).expect("just generated")).await
    }

    async fn enqueue_tasks(
        &self,
        job_id: Uuid,
        paths: &[String],
        kind: TaskKind,
        source_type: SourceType,
        source_url: Option<&str>,
    ) -> Result<u32, StoreError> {
        if paths.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let job_row: Option<(String, Option<i64>, i64)> = sqlx::query_as(
            "SELECT domain_id, max_pages, total_tasks FROM jobs WHERE id = ?",
        )
        .bind(job_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        let Some((domain_id, max_pages, total_tasks)) = job_row else {
            return Err(StoreError::JobNotFound(job_id));
        };

        let remaining_capacity = max_pages.map_or(i64::MAX, |max| (max - total_tasks).max(0));
        if remaining_capacity <= 0 {
            tx.commit().await?;
            return Ok(0);
        }

        let mut inserted = 0i64;
        let now = Utc::now().timestamp();

        for path in paths {
            if inserted >= remaining_capacity {
                break;
            }

            let page_id: (String,) = {
                let existing: Option<(String,)> = sqlx::query_as(
                    "SELECT id FROM pages WHERE domain_id = ? AND path = ?",
                )
                .bind(&domain_id)
                .bind(path)
                .fetch_optional(&mut *tx)
                .await?;
                if let Some(row) = existing {
                    row
                } else {
                    let id = Uuid::new_v4().to_string();
                    sqlx::query("INSERT INTO pages (id, domain_id, path) VALUES (?, ?, ?)")
                        .bind(&id)
                        .bind(&domain_id)
                        .bind(path)
                        .execute(&mut *tx)
                        .await?;
                    (id,)
                }
            };

            let task_id = Uuid::new_v4().to_string();
            let result = sqlx::query(
                r"INSERT OR IGNORE INTO tasks (
                    id, job_id, page_id, status, kind, retry_count, source_type, source_url, created_at
                ) VALUES (?, ?, ?, 'pending', ?, 0, ?, ?, ?)",
            )
            .bind(&task_id)
            .bind(job_id.to_string())
            .bind(&page_id.0)
            .bind(kind.as_str())
            .bind(source_type.as_str())
            .bind(source_url)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        if inserted > 0 {
            sqlx::query("UPDATE jobs SET total_tasks = total_tasks + ? WHERE id = ?")
                .bind(inserted)
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(inserted as u32)
    }

    async fn claim_next_task(
        &self,
        worker_id: &str,
        job_filter: Option<Uuid>,
    ) -> Result<Option<Task>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let job_filter_str = job_filter.map(|id| id.to_string());
        let candidate: Option<(String,)> = sqlx::query_as(
            r"SELECT t.id FROM tasks t
              JOIN jobs j ON j.id = t.job_id
              WHERE t.status = 'pending' AND j.status = 'running'
                AND (?1 IS NULL OR t.job_id = ?1)
              ORDER BY j.priority DESC, t.created_at ASC
              LIMIT 1",
        )
        .bind(&job_filter_str)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((task_id,)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE tasks SET status = 'running', started_at = ?, claimed_by = ? WHERE id = ?",
        )
        .bind(now)
        .bind(worker_id)
        .bind(&task_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN pages p ON p.id = t.page_id \
             JOIN domains d ON d.id = p.domain_id \
             WHERE t.id = ?"
        ))
        .bind(&task_id)
        .fetch_one(&mut *tx)
        .await?;

        let url = task_url(&row)?;
        let task = Self::row_to_task(&row, url)?;
        tx.commit().await?;
        Ok(Some(task))
    }

    async fn complete_task(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, String)> =
            sqlx::query_as("SELECT status, job_id FROM tasks WHERE id = ?")
                .bind(task_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let Some((status_str, job_id)) = current else {
            return Err(StoreError::JobNotFound(task_id));
        };
        let status = TaskStatus::parse(&status_str).expect("stored status is valid");
        if status.is_terminal() {
            tx.commit().await?;
            return Ok(());
        }

        let now = Utc::now().timestamp();
        let (new_status, counter_column) = match &outcome {
            TaskOutcome::Completed(_) | TaskOutcome::Discovered { .. } => {
                ("completed", "completed_tasks")
            }
            TaskOutcome::Failed(_) => ("failed", "failed_tasks"),
            TaskOutcome::Skipped(_) => ("skipped", "skipped_tasks"),
        };

        match outcome {
            TaskOutcome::Completed(ref result) => {
                sqlx::query(
                    r"UPDATE tasks SET status = ?, completed_at = ?, response_time_ms = ?,
                        status_code = ?, cache_status = ?, content_type = ?,
                        second_response_time_ms = ?, second_cache_status = ?,
                        external_redirect = ?
                      WHERE id = ?",
                )
                .bind(new_status)
                .bind(now)
                .bind(i64::from(result.response_time_ms))
                .bind(i64::from(result.status_code))
                .bind(&result.cache_status)
                .bind(&result.content_type)
                .bind(result.second_response_time_ms.map(i64::from))
                .bind(&result.second_cache_status)
                .bind(i64::from(result.external_redirect))
                .bind(task_id.to_string())
                .execute(&mut *tx)
                .await?;
            }
            TaskOutcome::Discovered { .. } => {
                sqlx::query("UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?")
                    .bind(new_status)
                    .bind(now)
                    .bind(task_id.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
            TaskOutcome::Failed(ref message) | TaskOutcome::Skipped(ref message) => {
                sqlx::query("UPDATE tasks SET status = ?, completed_at = ?, error = ? WHERE id = ?")
                    .bind(new_status)
                    .bind(now)
                    .bind(message)
                    .bind(task_id.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query(&format!(
            "UPDATE jobs SET {counter_column} = {counter_column} + 1 WHERE id = ?"
        ))
        .bind(&job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn reopen_task(&self, task_id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, i64, String)> = sqlx::query_as(
            r"SELECT t.status, t.retry_count, j.id
              FROM tasks t JOIN jobs j ON j.id = t.job_id
              WHERE t.id = ?",
        )
        .bind(task_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        let Some((status_str, retry_count, _job_id)) = row else {
            return Err(StoreError::JobNotFound(task_id));
        };
        let status = TaskStatus::parse(&status_str).expect("stored status is valid");
        if status.is_terminal() {
            return Err(StoreError::AlreadyTerminal(task_id));
        }

        sqlx::query(
            r"UPDATE tasks SET status = 'pending', started_at = NULL, completed_at = NULL,
                retry_count = ?, error = ? WHERE id = ?",
        )
        .bind(retry_count + 1)
        .bind(error)
        .bind(task_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn reclaim_expired_tasks(&self, lease: Duration) -> Result<u32, StoreError> {
        let cutoff = Utc::now().timestamp() - lease.as_secs() as i64;
        let mut tx = self.pool.begin().await?;

        let expired: Vec<(String, i64, i64, String)> = sqlx::query_as(
            r"SELECT t.id, t.retry_count, j.retry_limit, j.id
              FROM tasks t JOIN jobs j ON j.id = t.job_id
              WHERE t.status = 'running' AND t.started_at IS NOT NULL AND t.started_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        let now = Utc::now().timestamp();
        let mut reclaimed = 0u32;

        for (task_id, retry_count, retry_limit, job_id) in expired {
            if retry_count < retry_limit {
                sqlx::query(
                    r"UPDATE tasks SET status = 'pending', started_at = NULL, claimed_by = NULL,
                        retry_count = ? WHERE id = ?",
                )
                .bind(retry_count + 1)
                .bind(&task_id)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    r"UPDATE tasks SET status = 'failed', started_at = NULL, claimed_by = NULL,
                        completed_at = ?, error = 'lease expired, retry limit reached' WHERE id = ?",
                )
                .bind(now)
                .bind(&task_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("UPDATE jobs SET failed_tasks = failed_tasks + 1 WHERE id = ?")
                    .bind(&job_id)
                    .execute(&mut *tx)
                    .await?;
            }
            reclaimed += 1;
        }

        tx.commit().await?;
        Ok(reclaimed)
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some((current_str,)) = current else {
            return Err(StoreError::JobNotFound(job_id));
        };
        let current_status = JobStatus::parse(&current_str).expect("stored status is valid");
        if !current_status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: current_status,
                to: status,
            });
        }

        let now = Utc::now().timestamp();
        if status == JobStatus::Running {
            sqlx::query(
                "UPDATE jobs SET status = ?, started_at = COALESCE(started_at, ?) WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await?;
        } else if status.is_terminal() {
            sqlx::query(
                "UPDATE jobs SET status = ?, completed_at = COALESCE(completed_at, ?) WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        Self::row_to_job(&row)
    }

    async fn list_jobs(
        &self,
        organisation_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let org_filter = organisation_id.map(|id| id.to_string());
        let rows = sqlx::query(
            r"SELECT * FROM jobs WHERE (?1 IS NULL OR organisation_id = ?1)
              ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(&org_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list_tasks(
        &self,
        job_id: Uuid,
        filter: TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, StoreError> {
        let status_filter = filter.status.map(|s| s.as_str().to_string());
        let source_filter = filter.source_type.map(|s| s.as_str().to_string());

        let rows = sqlx::query(&format!(
            r"SELECT {TASK_COLUMNS} FROM tasks t
              JOIN pages p ON p.id = t.page_id
              JOIN domains d ON d.id = p.domain_id
              WHERE t.job_id = ?1
                AND (?2 IS NULL OR t.status = ?2)
                AND (?3 IS NULL OR t.source_type = ?3)
              ORDER BY t.created_at ASC LIMIT ?4 OFFSET ?5"
        ))
        .bind(job_id.to_string())
        .bind(&status_filter)
        .bind(&source_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let url = task_url(row)?;
                Self::row_to_task(row, url)
            })
            .collect()
    }

    async fn in_flight_count(&self, job_id: Uuid) -> Result<u32, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE job_id = ? AND status = 'running'",
        )
        .bind(job_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u32)
    }
}
