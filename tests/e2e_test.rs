//! End-to-end tests against a deployed service
//!
//! These tests require:
//! 1. PostgreSQL and Redis running
//! 2. API server running
//! 3. Worker process running with OpenAI, Google TTS and SendGrid credentials
//! 4. ffmpeg available to the worker
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:8000)

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_onboarding_video() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    println!("Submitting onboarding webhook for {}", SARAH_JOHNSON.name);
    let response = client
        .post(format!("{base_url}/webhooks/user-onboarding"))
        .json(&SARAH_JOHNSON.webhook())
        .send()
        .await
        .expect("Webhook request failed");
    assert!(response.status().is_success(), "Webhook rejected: {}", response.status());

    let accepted: WebhookResponse = response.json().await.expect("Invalid webhook response");
    println!("  job {} queued", accepted.job_id);

    let status = poll_job_status(&client, &base_url, accepted.job_id, 600)
        .await
        .expect("Job did not finish");
    assert_eq!(
        status.status, "completed",
        "Job failed: {:?}",
        status.error_message
    );

    let video_url = status.video_url.expect("Completed job has no video");
    let video = client
        .get(format!("{base_url}{video_url}"))
        .send()
        .await
        .expect("Video download failed");
    assert!(video.status().is_success());
    assert_eq!(video.headers()["content-type"], "video/mp4");

    let bytes = video.bytes().await.expect("Video body");
    assert!(bytes.len() > 1024, "Video is suspiciously small: {} bytes", bytes.len());
    println!("  video ready: {} bytes", bytes.len());
}
