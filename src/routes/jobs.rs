use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobStatus, JobUpdate};
use crate::models::status::{JobStatusResponse, VideoStatusResponse};
use crate::models::webhook::WebhookResponse;
use crate::routes::error::ApiError;
use crate::services::queue::QueuedJob;

/// Ids that do not parse cannot name a job, so they are simply not found.
pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::job_not_found())
}

/// GET /jobs/{job_id}/status
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let record = state.store.get(job_id).await?;
    Ok(Json(record.into()))
}

/// GET /jobs/{job_id}/video
pub async fn job_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<VideoStatusResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let record = state.store.get(job_id).await?;
    Ok(Json(record.into()))
}

/// POST /jobs/{job_id}/retry: run a failed job again.
///
/// A `queued` job is re-dispatched without touching its record, which
/// recovers a retry whose enqueue failed. Any other status is a conflict.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let record = state.store.get(job_id).await?;

    let record = match record.status {
        JobStatus::Failed => state.store.update(job_id, JobUpdate::Requeue).await?,
        JobStatus::Queued => record,
        status => {
            return Err(ApiError::Conflict(format!(
                "Only failed jobs can be retried, job is {status}"
            )))
        }
    };

    let employee = record.payload.ok_or_else(|| {
        tracing::error!(job_id = %job_id, "Retryable job has no stored payload");
        ApiError::Internal("Job cannot be retried".to_string())
    })?;

    state.queue.enqueue(&QueuedJob::new(job_id, employee)).await?;

    metrics::counter!("onboarding_jobs_total").increment(1);
    tracing::info!(
        job_id = %job_id,
        previous_retry_count = record.retry_count,
        "Re-queued job"
    );

    Ok(Json(WebhookResponse {
        success: true,
        message: "Job re-queued for video generation".to_string(),
        job_id: Some(job_id),
        processed_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_id_is_not_found() {
        let err = parse_job_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
        assert!(parse_job_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
