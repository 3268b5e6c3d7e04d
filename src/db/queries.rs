use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{IllegalTransition, JobRecord, JobStatus, JobUpdate};
use crate::models::webhook::EmployeeData;
use crate::services::job_store::{JobStore, StoreError};

const JOB_COLUMNS: &str = "id, status, employee_id, payload, created_at, started_at, \
                           completed_at, result_location, error_message, retry_count, updated_at";

/// PostgreSQL-backed job record store.
///
/// Updates run in a transaction that locks the row with `SELECT ... FOR UPDATE`,
/// so concurrent updates of one job are applied one after another.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: &PgRow) -> Result<JobRecord, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| StoreError::Corrupt(format!("unknown status `{status_str}`")))?;
    let payload: Option<Json<EmployeeData>> = row.try_get("payload")?;

    Ok(JobRecord {
        job_id: row.try_get("id")?,
        status,
        employee_id: row.try_get("employee_id")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        result_location: row.try_get("result_location")?,
        error_message: row.try_get("error_message")?,
        retry_count: row.try_get("retry_count")?,
        updated_at: row.try_get("updated_at")?,
        payload: payload.map(|Json(p)| p),
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job_id: Uuid, payload: EmployeeData) -> Result<JobRecord, StoreError> {
        let record = JobRecord::new(job_id, payload, Utc::now());

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO video_jobs (id, status, employee_id, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO NOTHING
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(record.job_id)
        .bind(record.status.to_string())
        .bind(&record.employee_id)
        .bind(record.payload.as_ref().map(Json))
        .bind(record.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_job(&row),
            None => Err(StoreError::Duplicate(job_id)),
        }
    }

    async fn update(&self, job_id: Uuid, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM video_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound(job_id))?;

        let mut record = row_to_job(&row)?;
        // Dropping `tx` on error rolls back and releases the row lock.
        record.apply(update, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE video_jobs
            SET status = $1,
                payload = $2,
                started_at = $3,
                completed_at = $4,
                result_location = $5,
                error_message = $6,
                retry_count = $7,
                updated_at = $8
            WHERE id = $9
            "#,
        )
        .bind(record.status.to_string())
        .bind(record.payload.as_ref().map(Json))
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(&record.result_location)
        .bind(&record.error_message)
        .bind(record.retry_count)
        .bind(record.updated_at)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get(&self, job_id: Uuid) -> Result<JobRecord, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM video_jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(job_id))?;

        row_to_job(&row)
    }

    async fn discard(&self, job_id: Uuid) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM video_jobs WHERE id = $1 AND status = 'queued'")
            .bind(job_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 1 {
            return Ok(());
        }

        let existing = self.get(job_id).await?;
        Err(StoreError::IllegalTransition(IllegalTransition {
            from: existing.status,
            to: JobStatus::Queued,
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
