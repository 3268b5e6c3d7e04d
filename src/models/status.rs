use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobRecord, JobStatus};

/// Response for `GET /jobs/{job_id}/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub employee_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            employee_id: job.employee_id,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            video_url: job.result_location,
            error_message: job.error_message,
            retry_count: job.retry_count,
        }
    }
}

/// Response for `GET /jobs/{job_id}/video`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VideoStatusResponse {
    pub job_id: Uuid,
    /// `ready`, `queued`, `processing` or `failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for VideoStatusResponse {
    fn from(job: JobRecord) -> Self {
        let (status, message) = match job.status {
            JobStatus::Completed => ("ready".to_string(), None),
            JobStatus::Processing => (
                "processing".to_string(),
                Some("Video is still being generated".to_string()),
            ),
            JobStatus::Queued => (
                "queued".to_string(),
                Some("Video generation has not started yet".to_string()),
            ),
            JobStatus::Failed => ("failed".to_string(), None),
        };

        Self {
            job_id: job.job_id,
            status,
            video_url: job.result_location,
            message,
            error: job.error_message,
        }
    }
}
