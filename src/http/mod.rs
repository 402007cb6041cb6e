//! Thin REST front door over the Job Manager/Store, built the way the
//! rest of this corpus wires `axum`: typed `State`, `Json` extractors,
//! and `IntoResponse` for the error envelope.
//!
//! Authentication, OAuth, and notifications are out of scope: the
//! webhook handler resolves `token` to a fixed placeholder
//! user/organisation instead of a real lookup table, and no auth
//! middleware gates the other routes.

use crate::domain::{Job, JobOptions, JobStatus, SourceType, Task};
use crate::engine::AppError;
use crate::job_manager::JobManager;
use crate::store::{TaskFilter, TaskStore};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Placeholder identity a webhook's opaque token resolves to, since real
/// auth/user-lookup is out of scope here.
const STUB_ORGANISATION_ID: Uuid = Uuid::nil();

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub job_manager: Arc<JobManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/jobs", post(create_job).get(list_jobs))
        .route("/v1/jobs/{id}", get(get_job).put(update_job).delete(cancel_job))
        .route("/v1/jobs/{id}/tasks", get(list_tasks))
        .route("/v1/webhooks/{provider}/{token}", post(webhook))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
    code: &'static str,
    request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status,
            message: self.to_string(),
            code: self.code(),
            request_id: Uuid::new_v4().to_string(),
        };
        let mut response = (
            axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
            Json(body),
        )
            .into_response();
        if let Self::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    domain: String,
    use_sitemap: Option<bool>,
    find_links: Option<bool>,
    concurrency: Option<u32>,
    max_pages: Option<u32>,
    skip_if_cached: Option<bool>,
    priority: Option<i32>,
    source_type: Option<String>,
    source_detail: Option<String>,
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(axum::http::StatusCode, Json<Job>), AppError> {
    if req.domain.trim().is_empty() {
        return Err(AppError::Validation("domain must not be empty".to_string()));
    }

    let defaults = JobOptions::default();
    let options = JobOptions {
        use_sitemap: req.use_sitemap.unwrap_or(defaults.use_sitemap),
        find_links: req.find_links.unwrap_or(defaults.find_links),
        concurrency: req.concurrency.unwrap_or(defaults.concurrency),
        max_pages: req.max_pages,
        skip_if_cached: req.skip_if_cached.unwrap_or(defaults.skip_if_cached),
        retry_limit: defaults.retry_limit,
    };
    let source_type = req
        .source_type
        .as_deref()
        .and_then(SourceType::parse)
        .unwrap_or(SourceType::Manual);

    let job = state
        .job_manager
        .create_job(
            STUB_ORGANISATION_ID,
            req.domain,
            options,
            req.priority.unwrap_or(crate::domain::DEFAULT_JOB_PRIORITY),
            source_type,
            req.source_detail,
        )
        .await?;
    state.job_manager.start_job(job.id).await?;
    let job = state.job_manager.get_job(job.id).await?;

    Ok((axum::http::StatusCode::CREATED, Json(job)))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Job>, AppError> {
    Ok(Json(state.job_manager.get_job(id).await?))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = state
        .store
        .list_jobs(None, q.limit.unwrap_or(50), q.offset.unwrap_or(0))
        .await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
struct UpdateJobRequest {
    status: String,
}

async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateJobRequest>,
) -> Result<Json<Job>, AppError> {
    let status = JobStatus::parse(&req.status)
        .ok_or_else(|| AppError::Validation(format!("unknown status {:?}", req.status)))?;
    if status != JobStatus::Cancelled {
        return Err(AppError::Validation("only cancellation is supported via this endpoint".into()));
    }
    state.job_manager.cancel_job(id).await?;
    Ok(Json(state.job_manager.get_job(id).await?))
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Job>, AppError> {
    state.job_manager.cancel_job(id).await?;
    Ok(Json(state.job_manager.get_job(id).await?))
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    status: Option<String>,
    source_type: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let filter = TaskFilter {
        status: q.status.as_deref().and_then(crate::domain::TaskStatus::parse),
        source_type: q.source_type.as_deref().and_then(SourceType::parse),
    };
    let tasks = state
        .store
        .list_tasks(id, filter, q.limit.unwrap_or(50), q.offset.unwrap_or(0))
        .await?;
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    domain: String,
}

async fn webhook(
    State(state): State<AppState>,
    Path((_provider, _token)): Path<(String, String)>,
    Json(payload): Json<WebhookPayload>,
) -> Result<(axum::http::StatusCode, Json<Job>), AppError> {
    let job = state
        .job_manager
        .create_job(
            STUB_ORGANISATION_ID,
            payload.domain,
            JobOptions::default(),
            crate::domain::DEFAULT_JOB_PRIORITY,
            SourceType::Manual,
            Some("webhook".to_string()),
        )
        .await?;
    state.job_manager.start_job(job.id).await?;
    let job = state.job_manager.get_job(job.id).await?;
    Ok((axum::http::StatusCode::CREATED, Json(job)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteTaskStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::open_in_memory().await.unwrap());
        let job_manager = Arc::new(JobManager::new(Arc::clone(&store)));
        router(AppState { store, job_manager })
    }

    #[tokio::test]
    async fn create_job_returns_201_with_running_job() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"domain":"example.test","use_sitemap":false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    }

    #[tokio::test]
    async fn create_job_rejects_empty_domain() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"domain":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_unknown_job_returns_404() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/v1/jobs/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
