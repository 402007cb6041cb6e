//! Scheduler Loop: the single process-wide loop that feeds the Worker
//! Pool from the Durable Task Store, reclaims abandoned leases, and
//! sweeps for jobs ready to finalise.
//!
//! Three independent `tokio::time::interval` ticks rather than one big
//! loop, so a slow reclaim sweep never delays dispatch — mirrors the
//! staged polling loop used for background job processing elsewhere in
//! this corpus, just split across three cadences instead of one.

use crate::job_manager::JobManager;
use crate::pool::{DispatchOutcome, WorkerPool};
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

const DISPATCH_INTERVAL: Duration = Duration::from_millis(500);
const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);
const COMPLETION_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// A task's claim lease: how long it may sit `running` before the
/// Scheduler Loop assumes the worker that claimed it is gone.
pub const CLAIM_LEASE: Duration = Duration::from_secs(90);

pub struct SchedulerLoop {
    store: Arc<dyn TaskStore>,
    pool: Arc<WorkerPool>,
    job_manager: Arc<JobManager>,
    work_available: Arc<Notify>,
}

impl SchedulerLoop {
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, pool: Arc<WorkerPool>, job_manager: Arc<JobManager>) -> Self {
        let work_available = Arc::clone(&job_manager.work_available);
        Self {
            store,
            pool,
            job_manager,
            work_available,
        }
    }

    /// Run all three ticks concurrently until the process is torn down.
    /// Each tick owns its own `tokio::time::interval`; they never block
    /// each other.
    pub async fn run(self: Arc<Self>) {
        let dispatch = Arc::clone(&self);
        let reclaim = Arc::clone(&self);
        let completion = Arc::clone(&self);

        tokio::join!(
            dispatch.run_dispatch_tick(),
            reclaim.run_reclaim_tick(),
            completion.run_completion_tick(),
        );
    }

    async fn run_dispatch_tick(self: Arc<Self>) {
        let mut interval = tokio::time::interval(DISPATCH_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = self.work_available.notified() => {}
            }
            self.drain_dispatch().await;
        }
    }

    /// Keep claiming and dispatching until the pool has no idle workers
    /// left or the store has nothing runnable, per the dispatch-tick stop
    /// condition.
    async fn drain_dispatch(&self) {
        loop {
            match self.pool.dispatch_once(None).await {
                DispatchOutcome::Dispatched => {}
                DispatchOutcome::NoIdleWorker | DispatchOutcome::NoRunnableTask => break,
            }
        }
    }

    async fn run_reclaim_tick(self: Arc<Self>) {
        let mut interval = tokio::time::interval(RECLAIM_INTERVAL);
        loop {
            interval.tick().await;
            match self.store.reclaim_expired_tasks(CLAIM_LEASE).await {
                Ok(0) => {}
                Ok(n) => {
                    info!(reclaimed = n, "reclaimed expired task leases");
                    self.work_available.notify_waiters();
                }
                Err(err) => warn!(%err, "reclaim_expired_tasks failed"),
            }
        }
    }

    async fn run_completion_tick(self: Arc<Self>) {
        let mut interval = tokio::time::interval(COMPLETION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let running_jobs = match self.store.list_jobs(None, 1000, 0).await {
                Ok(jobs) => jobs,
                Err(err) => {
                    warn!(%err, "list_jobs failed during completion sweep");
                    continue;
                }
            };
            for job in running_jobs {
                if job.status != crate::domain::JobStatus::Running {
                    continue;
                }
                if let Err(err) = self.job_manager.evaluate_job_completion(job.id).await {
                    warn!(job_id = %job.id, %err, "evaluate_job_completion failed during sweep");
                }
            }
        }
    }
}
