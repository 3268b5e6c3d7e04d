pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod videos;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::predicate::{DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the HTTP application. `/metrics` is mounted only when a Prometheus
/// recorder has been installed.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let mut app = Router::new()
        .route("/", get(webhooks::service_info))
        .route("/health", get(health::health_check))
        .route("/webhooks/status", get(webhooks::webhook_status))
        .route(
            "/webhooks/user-onboarding",
            post(webhooks::receive_user_onboarding),
        )
        .route("/jobs/{job_id}/status", get(jobs::job_status))
        .route("/jobs/{job_id}/video", get(jobs::job_video))
        .route("/jobs/{job_id}/retry", post(jobs::retry_job))
        .route("/videos/{file}", get(videos::stream_video))
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    // Videos are already compressed.
    let compression = CompressionLayer::new()
        .compress_when(DefaultPredicate::new().and(NotForContentType::const_new("video/")));

    app.layer(TraceLayer::new_for_http())
        .layer(compression)
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}
