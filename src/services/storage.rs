use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::request::ResponseDataStream;
use s3::{Bucket, Region};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Public location of a job's video, served by `GET /videos/{job_id}.mp4`.
pub fn video_location(job_id: Uuid) -> String {
    format!("/videos/{job_id}.mp4")
}

/// A stored video ready to be sent to a client. Neither variant holds the
/// whole video in memory.
pub enum Artifact {
    File { file: tokio::fs::File, len: u64 },
    Remote(ResponseDataStream),
}

/// Where finished videos live.
///
/// Keys are derived from the job id alone, so publishing the same job twice
/// overwrites one object instead of creating a second artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Publish the video at `local_path` and return its location.
    async fn put(&self, job_id: Uuid, local_path: &Path) -> Result<String, StorageError>;

    /// Open a published video; `None` if nothing was published for the job.
    async fn open(&self, job_id: Uuid) -> Result<Option<Artifact>, StorageError>;
}

/// Videos stored in a local output directory.
pub struct LocalArtifactStore {
    output_dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.output_dir.join(format!("{job_id}.mp4"))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, job_id: Uuid, local_path: &Path) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let target = self.path_for(job_id);
        // Copy to a sibling temp name first so readers never see a partial file.
        let staging = target.with_extension("mp4.part");
        tokio::fs::copy(local_path, &staging).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(video_location(job_id))
    }

    async fn open(&self, job_id: Uuid) -> Result<Option<Artifact>, StorageError> {
        match tokio::fs::File::open(self.path_for(job_id)).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some(Artifact::File { file, len }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2ArtifactStore {
    bucket: Box<Bucket>,
}

impl R2ArtifactStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    fn key_for(job_id: Uuid) -> String {
        format!("videos/{job_id}.mp4")
    }
}

#[async_trait]
impl ArtifactStore for R2ArtifactStore {
    async fn put(&self, job_id: Uuid, local_path: &Path) -> Result<String, StorageError> {
        let data = tokio::fs::read(local_path).await?;
        let response = self
            .bucket
            .put_object_with_content_type(Self::key_for(job_id), &data, VIDEO_CONTENT_TYPE)
            .await
            .map_err(StorageError::S3)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status(status));
        }
        Ok(video_location(job_id))
    }

    async fn open(&self, job_id: Uuid) -> Result<Option<Artifact>, StorageError> {
        let response = match self.bucket.get_object_stream(Self::key_for(job_id)).await {
            Ok(response) => response,
            Err(S3Error::HttpFailWithBody(404, _)) => return Ok(None),
            Err(e) => return Err(StorageError::S3(e)),
        };

        match response.status_code {
            200..=299 => Ok(Some(Artifact::Remote(response))),
            404 => Ok(None),
            status => Err(StorageError::Status(status)),
        }
    }
}

/// R2 when every `r2_*` setting is present, otherwise the local output directory.
pub fn artifact_store(config: &AppConfig) -> Result<Arc<dyn ArtifactStore>, StorageError> {
    match config.r2() {
        Some(r2) => {
            tracing::info!(bucket = r2.bucket, "Storing videos in R2");
            let store = R2ArtifactStore::new(r2.bucket, r2.endpoint, r2.access_key, r2.secret_key)?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!(output_dir = %config.output_dir.display(), "Storing videos locally");
            Ok(Arc::new(LocalArtifactStore::new(&config.output_dir)))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] S3Error),

    #[error("Object storage returned HTTP {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
