//! End-to-end scenarios against the store and job manager directly. The
//! store always builds task URLs as `https://{domain}{path}`, so a local
//! mock server can't stand in for a real fetch here; these scenarios drive
//! the same state machine a worker would, via `complete_task`/`reopen_task`,
//! to assert the job/task invariants a full run is expected to uphold.

use blue_banded_bee_engine::domain::{FetchOutcome, JobOptions, JobStatus, SourceType, TaskStatus};
use blue_banded_bee_engine::store::{SqliteTaskStore, TaskOutcome, TaskStore};
use blue_banded_bee_engine::{JobManager, UsageAccountant};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn store_and_manager() -> (Arc<dyn TaskStore>, JobManager) {
    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::open_in_memory().await.unwrap());
    let manager = JobManager::new(Arc::clone(&store));
    (store, manager)
}

fn completed_outcome(status_code: u16) -> FetchOutcome {
    FetchOutcome {
        response_time_ms: 42,
        status_code,
        cache_status: Some("HIT".to_string()),
        content_type: Some("text/html".to_string()),
        second_response_time_ms: Some(5),
        second_cache_status: Some("HIT".to_string()),
        external_redirect: false,
    }
}

#[tokio::test]
async fn happy_path_three_pages_complete() {
    let (store, manager) = store_and_manager().await;
    let job = manager
        .create_job(
            Uuid::new_v4(),
            "example.test".to_string(),
            JobOptions {
                use_sitemap: false,
                find_links: false,
                concurrency: 2,
                ..JobOptions::default()
            },
            0,
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();
    manager.start_job(job.id).await.unwrap();

    store
        .enqueue_pages(job.id, &["/a".to_string(), "/b".to_string()], SourceType::Manual, None)
        .await
        .unwrap();

    let job = manager.get_job(job.id).await.unwrap();
    assert_eq!(job.total_tasks, 3);

    let tasks = store
        .list_tasks(job.id, Default::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 3);

    for task in &tasks {
        store
            .complete_task(task.id, TaskOutcome::Completed(completed_outcome(200)))
            .await
            .unwrap();
    }
    manager.evaluate_job_completion(job.id).await.unwrap();

    let job = manager.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_tasks, 3);
    assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
}

#[tokio::test]
async fn deduplication_across_sources_is_idempotent() {
    let (store, manager) = store_and_manager().await;
    let job = manager
        .create_job(
            Uuid::new_v4(),
            "example.test".to_string(),
            JobOptions {
                use_sitemap: true,
                ..JobOptions::default()
            },
            0,
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();
    manager.start_job(job.id).await.unwrap();
    let seeded = manager.get_job(job.id).await.unwrap().total_tasks;

    let inserted_first = store
        .enqueue_pages(job.id, &["/x".to_string()], SourceType::Sitemap, None)
        .await
        .unwrap();
    assert_eq!(inserted_first, 1);

    // The same page resurfaces via a different discovery source (an anchor
    // on the root page links back to it).
    let inserted_second = store
        .enqueue_pages(job.id, &["/x".to_string()], SourceType::Link, None)
        .await
        .unwrap();
    assert_eq!(inserted_second, 0);

    let job = manager.get_job(job.id).await.unwrap();
    assert_eq!(job.total_tasks, seeded + 1);
}

#[tokio::test]
async fn retry_then_fail_records_retry_count_at_limit() {
    let (store, manager) = store_and_manager().await;
    let job = manager
        .create_job(
            Uuid::new_v4(),
            "example.test".to_string(),
            JobOptions {
                use_sitemap: false,
                retry_limit: 3,
                ..JobOptions::default()
            },
            0,
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();
    manager.start_job(job.id).await.unwrap();

    let task = store.claim_next_task("worker-1", Some(job.id)).await.unwrap().unwrap();
    for attempt in 0..3 {
        store.reopen_task(task.id, &format!("503 attempt {attempt}")).await.unwrap();
    }
    // Task is pending again with retry_count == 3; a 4th claim finally succeeds.
    let reclaimed = store.claim_next_task("worker-1", Some(job.id)).await.unwrap().unwrap();
    assert_eq!(reclaimed.retry_count, 3);
    store
        .complete_task(reclaimed.id, TaskOutcome::Completed(completed_outcome(200)))
        .await
        .unwrap();

    let tasks = store.list_tasks(job.id, Default::default(), 10, 0).await.unwrap();
    let finished = tasks.iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.retry_count, 3);
}

#[tokio::test]
async fn quota_exhaustion_skips_remaining_tasks() {
    let (store, manager) = store_and_manager().await;
    let usage = UsageAccountant::new();
    usage.set_plan(
        Uuid::nil(),
        blue_banded_bee_engine::domain::Plan {
            name: "test".to_string(),
            daily_page_limit: 2,
        },
    );

    let org_id = Uuid::nil();
    let job = manager
        .create_job(
            org_id,
            "example.test".to_string(),
            JobOptions {
                use_sitemap: false,
                ..JobOptions::default()
            },
            0,
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();
    manager.start_job(job.id).await.unwrap();
    store
        .enqueue_pages(
            job.id,
            &["/a".to_string(), "/b".to_string(), "/c".to_string(), "/d".to_string()],
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();

    let tasks = store.list_tasks(job.id, Default::default(), 10, 0).await.unwrap();
    assert_eq!(tasks.len(), 5);

    for task in &tasks {
        if usage.try_consume(org_id) {
            store
                .complete_task(task.id, TaskOutcome::Completed(completed_outcome(200)))
                .await
                .unwrap();
        } else {
            store
                .complete_task(task.id, TaskOutcome::Skipped("quota_exceeded".to_string()))
                .await
                .unwrap();
        }
    }
    manager.evaluate_job_completion(job.id).await.unwrap();

    let job = manager.get_job(job.id).await.unwrap();
    assert_eq!(job.completed_tasks, 2);
    assert_eq!(job.skipped_tasks, 3);
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn cancellation_mid_flight_stops_new_dispatch_but_lets_in_flight_finish() {
    let (store, manager) = store_and_manager().await;
    let job = manager
        .create_job(
            Uuid::new_v4(),
            "example.test".to_string(),
            JobOptions {
                use_sitemap: false,
                concurrency: 4,
                ..JobOptions::default()
            },
            0,
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();
    manager.start_job(job.id).await.unwrap();

    let paths: Vec<String> = (0..99).map(|i| format!("/page-{i}")).collect();
    store.enqueue_pages(job.id, &paths, SourceType::Manual, None).await.unwrap();

    // Claim and complete 10 tasks as if workers had already finished them.
    for _ in 0..10 {
        let task = store.claim_next_task("worker-1", Some(job.id)).await.unwrap().unwrap();
        store
            .complete_task(task.id, TaskOutcome::Completed(completed_outcome(200)))
            .await
            .unwrap();
    }

    // 4 more are claimed (in flight) before cancellation lands.
    let mut in_flight = Vec::new();
    for _ in 0..4 {
        in_flight.push(store.claim_next_task("worker-1", Some(job.id)).await.unwrap().unwrap());
    }

    manager.cancel_job(job.id).await.unwrap();
    assert!(manager.is_cancelled(job.id));

    // No further task can be claimed for this job once it's cancelled.
    let after_cancel = store.claim_next_task("worker-1", Some(job.id)).await.unwrap();
    assert!(after_cancel.is_none());

    // The 4 in-flight tasks still reach a terminal status.
    for task in in_flight {
        store
            .complete_task(task.id, TaskOutcome::Completed(completed_outcome(200)))
            .await
            .unwrap();
    }

    let job = manager.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.completed_tasks, 14);

    let tasks = store.list_tasks(job.id, Default::default(), 200, 0).await.unwrap();
    let still_pending = tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
    assert_eq!(still_pending, 100 - 14);
}

#[tokio::test]
async fn crash_recovery_reclaims_stale_leases() {
    let (store, manager) = store_and_manager().await;
    let job = manager
        .create_job(
            Uuid::new_v4(),
            "example.test".to_string(),
            JobOptions {
                use_sitemap: false,
                ..JobOptions::default()
            },
            0,
            SourceType::Manual,
            None,
        )
        .await
        .unwrap();
    manager.start_job(job.id).await.unwrap();
    store
        .enqueue_pages(job.id, &["/a".to_string(), "/b".to_string()], SourceType::Manual, None)
        .await
        .unwrap();

    // Claim all 3 tasks (the seed root task plus /a, /b), simulating a
    // worker that claimed them and then the process died.
    let mut claimed = Vec::new();
    while let Some(task) = store.claim_next_task("worker-1", Some(job.id)).await.unwrap() {
        claimed.push(task);
    }
    assert_eq!(claimed.len(), 3);

    // Lease timestamps are second-resolution; wait past a 1s lease so every
    // claimed task is unambiguously expired rather than racing the clock.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let reclaimed = store.reclaim_expired_tasks(Duration::from_secs(1)).await.unwrap();
    assert_eq!(reclaimed, 3);

    let tasks = store.list_tasks(job.id, Default::default(), 10, 0).await.unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));

    // Drains normally afterward.
    let task = store.claim_next_task("worker-2", Some(job.id)).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
}
