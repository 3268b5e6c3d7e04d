use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: Prometheus text exposition of the job counters, stage
/// retries, processing histogram and queue depth gauge.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!("onboarding_jobs_total", "Total onboarding video jobs queued");
    metrics::describe_counter!("onboarding_jobs_completed", "Total onboarding video jobs completed");
    metrics::describe_counter!("onboarding_jobs_failed", "Total onboarding video jobs that failed");
    metrics::describe_counter!(
        "onboarding_stage_retries_total",
        "Transient pipeline stage failures that were retried"
    );
    metrics::describe_histogram!(
        "video_processing_seconds",
        "Time from claiming a job to its terminal update"
    );
    metrics::describe_gauge!(
        "onboarding_queue_depth",
        "Current number of pending jobs in the queue"
    );
}
