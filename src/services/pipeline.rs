//! The fixed sequence of external calls that turns onboarding data into a
//! delivered video: script → audio → slides → composition → notification.
//!
//! Each stage is a trait object so the worker can be exercised with fakes.
//! Stages report [`StageError::Transient`] for failures worth retrying
//! (timeouts, rate limits, 5xx) and [`StageError::Permanent`] for everything
//! else; the executor retries transient failures according to
//! [`RetryPolicy`] and aborts the run on the first unrecoverable one.

use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumIter};
use uuid::Uuid;

use crate::models::webhook::EmployeeData;
use crate::services::queue::QueuedJob;
use crate::services::storage::ArtifactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Script,
    Audio,
    Slides,
    Composition,
    Notification,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),
}

impl StageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StageError::Transient(_))
    }

    /// Classify a transport-level HTTP failure.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            StageError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, &err.to_string())
        } else if err.is_decode() {
            StageError::Permanent(format!("unreadable response: {err}"))
        } else {
            StageError::Transient(err.to_string())
        }
    }

    /// Classify a non-success HTTP status returned by a vendor.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", truncate(body, 300));
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            StageError::Transient(message)
        } else {
            StageError::Permanent(message)
        }
    }

    pub fn from_io(context: &str, err: std::io::Error) -> Self {
        StageError::Permanent(format!("{context}: {err}"))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Bounded per-stage retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per stage, including the first.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Who says which line of the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Speaker {
    #[strum(serialize = "Alex")]
    Host1,
    #[strum(serialize = "Jordan")]
    Host2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
}

/// Combined narration track for the whole script.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub path: PathBuf,
    pub duration: Duration,
}

/// A slide background plus the caption drawn on top of it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSlide {
    pub image_path: PathBuf,
    pub caption_path: PathBuf,
}

#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, employee: &EmployeeData) -> Result<Script, StageError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, script: &Script, work_dir: &Path) -> Result<Narration, StageError>;
}

#[async_trait]
pub trait SlideRenderer: Send + Sync {
    async fn render(
        &self,
        employee: &EmployeeData,
        work_dir: &Path,
    ) -> Result<Vec<RenderedSlide>, StageError>;
}

#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Produce the final video inside `work_dir` and return its path.
    async fn compose(
        &self,
        slides: &[RenderedSlide],
        narration: &Narration,
        work_dir: &Path,
    ) -> Result<PathBuf, StageError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, employee: &EmployeeData, video_location: &str) -> Result<(), StageError>;
}

/// Every collaborator the pipeline calls, in stage order.
#[derive(Clone)]
pub struct Stages {
    pub script: Arc<dyn ScriptWriter>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub slides: Arc<dyn SlideRenderer>,
    pub composer: Arc<dyn VideoComposer>,
    pub notifier: Arc<dyn Notifier>,
}

/// Successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub result_location: String,
    /// Transient retries consumed across all stages.
    pub retries: u32,
}

/// Unrecoverable failure, after any retries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: StageError,
    pub retries: u32,
}

pub struct Pipeline {
    stages: Stages,
    artifacts: Arc<dyn ArtifactStore>,
    retry: RetryPolicy,
    temp_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        stages: Stages,
        artifacts: Arc<dyn ArtifactStore>,
        retry: RetryPolicy,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stages,
            artifacts,
            retry,
            temp_dir: temp_dir.into(),
        }
    }

    /// Scratch directory holding a job's intermediate files.
    pub fn work_dir(&self, job_id: Uuid) -> PathBuf {
        self.temp_dir.join(job_id.to_string())
    }

    /// Run every stage in order, stopping at the first unrecoverable failure.
    pub async fn run(&self, job: &QueuedJob) -> Result<PipelineOutput, PipelineFailure> {
        let employee = &job.employee;
        let work_dir = self.work_dir(job.job_id);
        let mut retries = 0;

        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| PipelineFailure {
                stage: Stage::Script,
                error: StageError::from_io("creating work directory", e),
                retries,
            })?;

        let script = self
            .run_stage(job.job_id, Stage::Script, &mut retries, || {
                self.stages.script.write_script(employee)
            })
            .await?;

        let narration = self
            .run_stage(job.job_id, Stage::Audio, &mut retries, || {
                self.stages.speech.synthesize(&script, &work_dir)
            })
            .await?;

        let slides = self
            .run_stage(job.job_id, Stage::Slides, &mut retries, || {
                self.stages.slides.render(employee, &work_dir)
            })
            .await?;

        let result_location = self
            .run_stage(job.job_id, Stage::Composition, &mut retries, || {
                self.compose_and_publish(job.job_id, &slides, &narration, &work_dir)
            })
            .await?;

        self.run_stage(job.job_id, Stage::Notification, &mut retries, || {
            self.stages.notifier.notify(employee, &result_location)
        })
        .await?;

        Ok(PipelineOutput {
            result_location,
            retries,
        })
    }

    async fn compose_and_publish(
        &self,
        job_id: Uuid,
        slides: &[RenderedSlide],
        narration: &Narration,
        work_dir: &Path,
    ) -> Result<String, StageError> {
        let video = self.stages.composer.compose(slides, narration, work_dir).await?;
        self.artifacts
            .put(job_id, &video)
            .await
            .map_err(|e| StageError::Transient(format!("publishing video: {e}")))
    }

    async fn run_stage<T, F, Fut>(
        &self,
        job_id: Uuid,
        stage: Stage,
        retries: &mut u32,
        mut op: F,
    ) -> Result<T, PipelineFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let mut attempt = 1;
        loop {
            tracing::debug!(job_id = %job_id, stage = %stage, attempt, "Running stage");
            let started = std::time::Instant::now();

            match op().await {
                Ok(value) => {
                    tracing::info!(
                        job_id = %job_id,
                        stage = %stage,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Stage complete"
                    );
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        job_id = %job_id,
                        stage = %stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient stage failure, retrying"
                    );
                    metrics::counter!("onboarding_stage_retries_total", "stage" => stage.to_string())
                        .increment(1);
                    *retries += 1;
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::error!(
                        job_id = %job_id,
                        stage = %stage,
                        attempt,
                        error = %error,
                        "Stage failed"
                    );
                    return Err(PipelineFailure {
                        stage,
                        error,
                        retries: *retries,
                    });
                }
            }
        }
    }

    /// Remove the job's scratch directory. Missing directories are fine.
    pub async fn cleanup(&self, job_id: Uuid) {
        let work_dir = self.work_dir(job_id);
        match tokio::fs::remove_dir_all(&work_dir).await {
            Ok(()) => tracing::debug!(job_id = %job_id, "Removed work directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                job_id = %job_id,
                path = %work_dir.display(),
                error = %e,
                "Failed to remove work directory"
            ),
        }
    }
}
