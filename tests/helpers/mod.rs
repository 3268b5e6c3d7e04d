//! Test helper utilities: an in-process server backed by in-memory stores
//! and instant pipeline stages.

#![allow(dead_code)]

use async_trait::async_trait;
use preboarding_service::{
    app_state::AppState,
    models::webhook::EmployeeData,
    routes,
    services::{
        job_store::InMemoryJobStore,
        pipeline::{
            Narration, Notifier, Pipeline, RenderedSlide, RetryPolicy, Script, ScriptLine,
            ScriptWriter, SlideRenderer, Speaker, SpeechSynthesizer, StageError, Stages,
            VideoComposer,
        },
        queue::InMemoryJobQueue,
        storage::LocalArtifactStore,
        worker::Worker,
    },
};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

pub const FAKE_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42fake onboarding video";

/// Response from POST /webhooks/user-onboarding
#[derive(Debug, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub job_id: Uuid,
    pub processed_at: String,
}

/// Response from GET /jobs/{job_id}/status
#[derive(Debug, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub employee_id: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

/// Server running on an ephemeral port with handles to its backends.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryJobStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub artifacts: Arc<LocalArtifactStore>,
    pub root: tempfile::TempDir,
}

pub async fn spawn_app() -> TestApp {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let store = Arc::new(InMemoryJobStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let artifacts = Arc::new(LocalArtifactStore::new(root.path().join("videos")));

    let state = AppState::new(store.clone(), queue.clone(), artifacts.clone());
    let app = routes::router(state, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        store,
        queue,
        artifacts,
        root,
    }
}

impl TestApp {
    pub fn temp_dir(&self) -> PathBuf {
        self.root.path().join("tmp")
    }

    /// A worker sharing this app's queue, store and artifact directory.
    pub fn worker(&self, stages: Stages) -> Worker {
        let pipeline = Pipeline::new(
            stages,
            self.artifacts.clone(),
            RetryPolicy {
                max_attempts: 2,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            self.temp_dir(),
        );
        Worker::new(
            self.store.clone(),
            self.queue.clone(),
            Arc::new(pipeline),
            Duration::from_secs(10),
            Duration::from_millis(50),
        )
    }

    pub async fn post_webhook(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}/webhooks/user-onboarding", self.base_url))
            .json(body)
            .send()
            .await
            .expect("Webhook request failed")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn job_status(&self, job_id: Uuid) -> JobStatusResponse {
        let response = self.get(&format!("/jobs/{job_id}/status")).await;
        assert!(response.status().is_success(), "status lookup failed: {}", response.status());
        response.json().await.expect("Invalid status body")
    }
}

/// Poll job status until completed or failed (with timeout)
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 10; // Poll every 100ms

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{base_url}/jobs/{job_id}/status"))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {error_text}").into());
        }

        let status = response.json::<JobStatusResponse>().await?;
        match status.status.as_str() {
            "completed" | "failed" => return Ok(status),
            "queued" | "processing" => sleep(Duration::from_millis(100)).await,
            other => return Err(format!("Unknown job status: {other}").into()),
        }
    }

    Err(format!("Job did not finish within {timeout_secs} seconds").into())
}

/// Instant pipeline stages. The composer fails permanently while
/// `compose_failures` is above zero.
#[derive(Default)]
pub struct StubStages {
    pub compose_failures: AtomicU32,
    pub notified: Mutex<Vec<(String, String)>>,
}

impl StubStages {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_composition(times: u32) -> Arc<Self> {
        let stubs = Self::default();
        stubs.compose_failures.store(times, Ordering::SeqCst);
        Arc::new(stubs)
    }

    pub fn stages(self: &Arc<Self>) -> Stages {
        Stages {
            script: self.clone(),
            speech: self.clone(),
            slides: self.clone(),
            composer: self.clone(),
            notifier: self.clone(),
        }
    }

    /// `(email, video_location)` of every notification sent.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptWriter for StubStages {
    async fn write_script(&self, employee: &EmployeeData) -> Result<Script, StageError> {
        Ok(Script {
            lines: vec![
                ScriptLine {
                    speaker: Speaker::Host1,
                    text: format!("Welcome, {}!", employee.first_name()),
                },
                ScriptLine {
                    speaker: Speaker::Host2,
                    text: "We're glad you're here.".to_string(),
                },
            ],
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for StubStages {
    async fn synthesize(&self, _script: &Script, work_dir: &Path) -> Result<Narration, StageError> {
        let path = work_dir.join("narration.mp3");
        tokio::fs::write(&path, b"ID3")
            .await
            .map_err(|e| StageError::from_io("writing narration", e))?;
        Ok(Narration {
            path,
            duration: Duration::from_secs(15),
        })
    }
}

#[async_trait]
impl SlideRenderer for StubStages {
    async fn render(
        &self,
        _employee: &EmployeeData,
        work_dir: &Path,
    ) -> Result<Vec<RenderedSlide>, StageError> {
        Ok(vec![RenderedSlide {
            image_path: work_dir.join("01_welcome.png"),
            caption_path: work_dir.join("01_welcome.txt"),
        }])
    }
}

#[async_trait]
impl VideoComposer for StubStages {
    async fn compose(
        &self,
        _slides: &[RenderedSlide],
        _narration: &Narration,
        work_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        let remaining = self.compose_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.compose_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StageError::Permanent("ffmpeg exited with status 1".to_string()));
        }
        let path = work_dir.join("final.mp4");
        tokio::fs::write(&path, FAKE_VIDEO)
            .await
            .map_err(|e| StageError::from_io("writing video", e))?;
        Ok(path)
    }
}

#[async_trait]
impl Notifier for StubStages {
    async fn notify(&self, employee: &EmployeeData, video_location: &str) -> Result<(), StageError> {
        self.notified
            .lock()
            .unwrap()
            .push((employee.email.clone(), video_location.to_string()));
        Ok(())
    }
}
