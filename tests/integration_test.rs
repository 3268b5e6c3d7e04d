//! Integration tests against real PostgreSQL and Redis.
//!
//! Requires DATABASE_URL and REDIS_URL pointing at disposable instances.
//!
//! Run with: cargo test --test integration_test -- --ignored

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;
use preboarding_service::{
    db::{self, queries::PgJobStore},
    models::{job::JobStatus, webhook::EmployeeData},
    services::{
        job_store::JobStore,
        pipeline::Pipeline,
        queue::{JobQueue, QueuedJob, RedisJobQueue},
        storage::LocalArtifactStore,
        worker::{JobOutcome, Worker},
    },
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("{key} must be set for integration tests"))
}

fn employee() -> EmployeeData {
    serde_json::from_value(SARAH_JOHNSON.employee_data()).unwrap()
}

/// Full job lifecycle through PostgreSQL and Redis:
/// 1. Record creation and lookup
/// 2. Enqueue and reliable dequeue
/// 3. Worker claim, pipeline run and terminal update
/// 4. Duplicate delivery skipped
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    let pool = db::init_pool(&env("DATABASE_URL"))
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));
    let queue_name = format!("video_generation_test_{}", Uuid::new_v4().simple());
    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::new(&env("REDIS_URL"), &queue_name).expect("Failed to initialize queue"),
    );

    store.health_check().await.expect("Store health check failed");
    queue.health_check().await.expect("Queue health check failed");

    // 1. Record creation
    let job = QueuedJob::new(Uuid::new_v4(), employee());
    let created = store.create(job.job_id, job.employee.clone()).await.unwrap();
    assert_eq!(created.status, JobStatus::Queued);
    assert_eq!(created.employee_id, "EMP001");
    assert_eq!(created.retry_count, 0);

    let fetched = store.get(job.job_id).await.unwrap();
    assert_eq!(fetched.job_id, job.job_id);
    assert_eq!(fetched.payload.as_ref(), Some(&job.employee));

    // 2. Queue
    queue.enqueue(&job).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    // 3. Worker
    let dir = tempfile::tempdir().unwrap();
    let stubs = StubStages::healthy();
    let pipeline = Arc::new(Pipeline::new(
        stubs.stages(),
        Arc::new(LocalArtifactStore::new(dir.path().join("videos"))),
        Default::default(),
        dir.path().join("tmp"),
    ));
    let worker = Worker::new(
        store.clone(),
        queue.clone(),
        pipeline,
        Duration::from_secs(30),
        Duration::from_secs(1),
    );

    assert_eq!(worker.process_next().await.unwrap(), Some(JobOutcome::Completed));
    let completed = store.get(job.job_id).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(
        completed.result_location,
        Some(format!("/videos/{}.mp4", job.job_id))
    );
    assert!(completed.payload.is_none());
    assert!(completed.started_at.unwrap() <= completed.completed_at.unwrap());

    // 4. Duplicate delivery
    queue.enqueue(&job).await.unwrap();
    assert_eq!(worker.process_next().await.unwrap(), Some(JobOutcome::Skipped));
    assert_eq!(store.get(job.job_id).await.unwrap(), completed);
    assert_eq!(queue.depth().await.unwrap(), 0);
    assert_eq!(stubs.notifications().len(), 1);
}

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_concurrent_claims_in_postgres() {
    let pool = db::init_pool(&env("DATABASE_URL"))
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    let store = Arc::new(PgJobStore::new(pool));

    let job_id = Uuid::new_v4();
    store.create(job_id, employee()).await.unwrap();

    let claims = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .update(job_id, preboarding_service::models::job::JobUpdate::Start)
                .await
                .is_ok()
        })
    });
    let winners = futures::future::join_all(claims)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(true)))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(store.get(job_id).await.unwrap().status, JobStatus::Processing);
}
