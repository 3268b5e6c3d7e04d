use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use garde::Validate;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::webhook::{OnboardingWebhook, WebhookResponse, ONBOARDING_EVENT};
use crate::routes::error::ApiError;
use crate::services::queue::QueuedJob;

/// POST /webhooks/user-onboarding: accept an onboarding event and queue
/// video generation.
///
/// The job record is written before the job is enqueued. If the enqueue
/// fails the record is discarded again, so a 503 never leaves a job behind.
pub async fn receive_user_onboarding(
    State(state): State<AppState>,
    payload: Result<Json<OnboardingWebhook>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected malformed webhook payload");
        ApiError::BadRequest(format!("Invalid payload: {}", rejection.body_text()))
    })?;

    if let Err(report) = payload.validate() {
        tracing::warn!(error = %report, "Webhook payload failed validation");
        return Err(ApiError::Validation(format!("Validation failed: {report}")));
    }

    if payload.event_type != ONBOARDING_EVENT {
        tracing::warn!(
            event_type = %payload.event_type,
            "Unexpected event type on onboarding webhook, processing as onboarding"
        );
    }

    let employee = payload.employee_data;
    let job_id = Uuid::new_v4();

    state.store.create(job_id, employee.clone()).await?;

    let job = QueuedJob::new(job_id, employee);
    if let Err(e) = state.queue.enqueue(&job).await {
        if let Err(discard) = state.store.discard(job_id).await {
            tracing::error!(job_id = %job_id, error = %discard, "Failed to discard unqueued job");
        }
        return Err(e.into());
    }

    metrics::counter!("onboarding_jobs_total").increment(1);
    tracing::info!(
        job_id = %job_id,
        employee_id = %job.employee.employee_id,
        "Queued onboarding video job"
    );

    Ok(Json(WebhookResponse {
        success: true,
        message: format!(
            "Onboarding video generation started for {}",
            job.employee.name
        ),
        job_id: Some(job_id),
        processed_at: Utc::now(),
    }))
}

/// GET /webhooks/status: webhook endpoint discovery.
pub async fn webhook_status() -> Json<Value> {
    Json(json!({
        "status": "active",
        "endpoints": {
            "user_onboarding": {
                "method": "POST",
                "path": "/webhooks/user-onboarding",
                "event_type": ONBOARDING_EVENT,
            }
        }
    }))
}

/// GET /: service information.
pub async fn service_info() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "webhook": "POST /webhooks/user-onboarding",
            "job_status": "GET /jobs/{job_id}/status",
            "job_video": "GET /jobs/{job_id}/video",
            "job_retry": "POST /jobs/{job_id}/retry",
            "videos": "GET /videos/{job_id}.mp4",
            "health": "GET /health",
            "metrics": "GET /metrics",
        }
    }))
}
