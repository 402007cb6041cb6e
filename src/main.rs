use anyhow::{Context, Result};
use blue_banded_bee_engine::http::{self, AppState};
use blue_banded_bee_engine::{AppConfig, Fetcher, JobManager, SchedulerLoop, SqliteTaskStore, UsageAccountant, WorkerPool};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_path = config
        .database_url
        .strip_prefix("sqlite://")
        .unwrap_or(&config.database_url);
    let store: Arc<dyn blue_banded_bee_engine::TaskStore> = if db_path == ":memory:" {
        Arc::new(SqliteTaskStore::open_in_memory().await?)
    } else {
        Arc::new(SqliteTaskStore::open(Path::new(db_path)).await?)
    };

    let job_manager = Arc::new(JobManager::new(Arc::clone(&store)));
    let rate_limiter = Arc::new(blue_banded_bee_engine::engine::RateLimiter::new());
    let usage = Arc::new(UsageAccountant::new());
    let fetcher = Arc::new(Fetcher::new());
    let http_client = reqwest::Client::new();

    let pool = Arc::new(WorkerPool::new(
        config.worker_count,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        Arc::clone(&rate_limiter),
        Arc::clone(&usage),
        Arc::clone(&job_manager),
        http_client,
    ));

    let scheduler = Arc::new(SchedulerLoop::new(Arc::clone(&store), Arc::clone(&pool), Arc::clone(&job_manager)));
    tokio::spawn(scheduler.run());

    let state = AppState {
        store: Arc::clone(&store),
        job_manager: Arc::clone(&job_manager),
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, workers = config.worker_count, "blue-banded-bee listening");
    axum::serve(listener, app).await.context("http server failed")?;

    Ok(())
}
