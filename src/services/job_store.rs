use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::job::{IllegalTransition, JobRecord, JobStatus, JobUpdate};
use crate::models::webhook::EmployeeData;

/// Keyed storage of job records.
///
/// Implementations serialize `update` per `job_id` and validate every
/// change with [`JobRecord::apply`], so the lifecycle is enforced at the
/// store boundary regardless of backend.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` record. Fails with `Duplicate` if the id exists.
    async fn create(&self, job_id: Uuid, payload: EmployeeData) -> Result<JobRecord, StoreError>;

    async fn update(&self, job_id: Uuid, update: JobUpdate) -> Result<JobRecord, StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<JobRecord, StoreError>;

    /// Remove a `queued` record that never made it onto the queue.
    async fn discard(&self, job_id: Uuid) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} already exists")]
    Duplicate(Uuid),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Backend unavailability, as opposed to an integrity error.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

/// Mutex-guarded map of job records.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JobRecord>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job_id: Uuid, payload: EmployeeData) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&job_id) {
            return Err(StoreError::Duplicate(job_id));
        }
        let record = JobRecord::new(job_id, payload, Utc::now());
        jobs.insert(job_id, record.clone());
        Ok(record)
    }

    async fn update(&self, job_id: Uuid, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs();
        let record = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        record.apply(update, Utc::now())?;
        Ok(record.clone())
    }

    async fn get(&self, job_id: Uuid) -> Result<JobRecord, StoreError> {
        self.jobs()
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn discard(&self, job_id: Uuid) -> Result<(), StoreError> {
        let mut jobs = self.jobs();
        match jobs.get(&job_id) {
            None => Err(StoreError::NotFound(job_id)),
            Some(record) if record.status != JobStatus::Queued => {
                Err(StoreError::IllegalTransition(IllegalTransition {
                    from: record.status,
                    to: JobStatus::Queued,
                }))
            }
            Some(_) => {
                jobs.remove(&job_id);
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::webhook::tests::sample_employee;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        let created = store.create(id, sample_employee()).await.unwrap();
        assert_eq!(created.status, JobStatus::Queued);

        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, sample_employee()).await.unwrap();
        let err = store.create(id, sample_employee()).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(d) if d == id));
    }

    #[tokio::test]
    async fn test_unknown_job_not_found() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update(id, JobUpdate::Start).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_illegal_update_leaves_record_unchanged() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, sample_employee()).await.unwrap();
        let err = store
            .update(
                id,
                JobUpdate::Complete {
                    result_location: "/videos/x.mp4".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition(_)));
        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = Uuid::new_v4();
        store.create(id, sample_employee()).await.unwrap();

        let claims: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.update(id, JobUpdate::Start).await })
            })
            .collect();

        let winners = futures::future::join_all(claims)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_racing_terminal_updates_keep_timestamps_ordered() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = Uuid::new_v4();
        store.create(id, sample_employee()).await.unwrap();
        store.update(id, JobUpdate::Start).await.unwrap();

        let complete = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(
                        id,
                        JobUpdate::Complete {
                            result_location: "/videos/a.mp4".to_string(),
                        },
                    )
                    .await
            })
        };
        let fail = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(
                        id,
                        JobUpdate::Fail {
                            error_message: "late".to_string(),
                            retry_count: 0,
                        },
                    )
                    .await
            })
        };
        let (a, b) = (complete.await.unwrap(), fail.await.unwrap());
        assert!(a.is_ok() ^ b.is_ok());

        let job = store.get(id).await.unwrap();
        assert!(job.status.is_terminal());
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
    }

    #[tokio::test]
    async fn test_discard_only_queued() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.create(id, sample_employee()).await.unwrap();
        assert_ok!(store.discard(id).await);
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));

        let id = Uuid::new_v4();
        store.create(id, sample_employee()).await.unwrap();
        store.update(id, JobUpdate::Start).await.unwrap();
        assert_err!(store.discard(id).await);
        assert_ok!(store.get(id).await);
    }
}
