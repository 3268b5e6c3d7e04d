use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::pipeline::RetryPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus scrape address of the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    /// PostgreSQL connection string for job records
    pub database_url: String,

    /// Redis connection string for the job queue
    pub redis_url: String,

    /// Redis key prefix of the video generation queue
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// OpenAI API key (script generation). Worker only.
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Google Cloud Text-to-Speech API key. Worker only.
    pub google_tts_api_key: Option<String>,

    /// SendGrid API key (notification email). Worker only.
    pub sendgrid_api_key: Option<String>,

    /// Sender address of the notification email. Worker only.
    pub from_email: Option<String>,

    /// Public base URL prepended to artifact locations in emails
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-job scratch space, removed once a job is terminal
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Local artifact directory (used when no R2 bucket is configured)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Optional R2 bucket for artifacts (S3-compatible)
    pub r2_bucket: Option<String>,
    pub r2_endpoint: Option<String>,
    pub r2_access_key: Option<String>,
    pub r2_secret_key: Option<String>,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// TTF font handed to ffmpeg drawtext; ffmpeg's default when unset
    pub font_path: Option<String>,

    /// Number of concurrent job loops per worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Upper bound for a whole pipeline run
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Attempts per stage, including the first one
    #[serde(default = "default_stage_max_attempts")]
    pub stage_max_attempts: u32,

    #[serde(default = "default_stage_backoff_ms")]
    pub stage_backoff_ms: u64,

    #[serde(default = "default_stage_max_backoff_ms")]
    pub stage_max_backoff_ms: u64,

    /// How long a worker blocks on the queue before re-checking for shutdown
    #[serde(default = "default_dequeue_timeout_secs")]
    pub dequeue_timeout_secs: u64,

    /// Timeout applied to every outbound vendor request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Vendor credentials the pipeline stages need.
pub struct VendorCredentials<'a> {
    pub openai_api_key: &'a str,
    pub google_tts_api_key: &'a str,
    pub sendgrid_api_key: &'a str,
    pub from_email: &'a str,
}

#[derive(Debug, thiserror::Error)]
#[error("{0} must be set to run the worker")]
pub struct MissingSetting(pub &'static str);

/// R2 connection settings, present only when every field is configured.
pub struct R2Settings<'a> {
    pub bucket: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_queue_name() -> String {
    "video_generation".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/preboarding")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./videos")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_job_timeout_secs() -> u64 {
    600 // 10 minutes
}

fn default_stage_max_attempts() -> u32 {
    3
}

fn default_stage_backoff_ms() -> u64 {
    1000
}

fn default_stage_max_backoff_ms() -> u64 {
    30_000
}

fn default_dequeue_timeout_secs() -> u64 {
    5
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn r2(&self) -> Option<R2Settings<'_>> {
        Some(R2Settings {
            bucket: self.r2_bucket.as_deref()?,
            endpoint: self.r2_endpoint.as_deref()?,
            access_key: self.r2_access_key.as_deref()?,
            secret_key: self.r2_secret_key.as_deref()?,
        })
    }

    pub fn vendor_credentials(&self) -> Result<VendorCredentials<'_>, MissingSetting> {
        fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, MissingSetting> {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or(MissingSetting(key))
        }

        Ok(VendorCredentials {
            openai_api_key: required(&self.openai_api_key, "OPENAI_API_KEY")?,
            google_tts_api_key: required(&self.google_tts_api_key, "GOOGLE_TTS_API_KEY")?,
            sendgrid_api_key: required(&self.sendgrid_api_key, "SENDGRID_API_KEY")?,
            from_email: required(&self.from_email, "FROM_EMAIL")?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.stage_max_attempts.max(1),
            base_backoff: Duration::from_millis(self.stage_backoff_ms),
            max_backoff: Duration::from_millis(self.stage_max_backoff_ms),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
