use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::app_state::AppState;
use crate::models::job::JobStatus;
use crate::routes::error::ApiError;
use crate::routes::jobs::parse_job_id;
use crate::services::storage::Artifact;

/// GET /videos/{job_id}.mp4: stream a finished video.
///
/// Only completed jobs are served, even if an artifact was already
/// published by a run that later failed.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = file
        .strip_suffix(".mp4")
        .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))
        .and_then(parse_job_id)?;

    let record = state.store.get(job_id).await?;
    if record.status != JobStatus::Completed {
        return Err(ApiError::NotFound("Video not ready".to_string()));
    }

    let artifact = state.artifacts.open(job_id).await?.ok_or_else(|| {
        tracing::error!(job_id = %job_id, "Completed job has no stored video");
        ApiError::NotFound("Video not found".to_string())
    })?;

    let response = match artifact {
        Artifact::File { file, len } => (
            [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (header::CONTENT_LENGTH, len.to_string()),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response(),
        Artifact::Remote(object) => (
            [(header::CONTENT_TYPE, "video/mp4")],
            Body::from_stream(object.bytes),
        )
            .into_response(),
    };
    Ok(response)
}
