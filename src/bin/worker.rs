use metrics_exporter_prometheus::PrometheusBuilder;
use preboarding_service::{
    config::AppConfig,
    db::{self, queries::PgJobStore},
    routes,
    services::{
        composer::FfmpegComposer,
        job_store::JobStore,
        notification::SendGridNotifier,
        pipeline::{Pipeline, Stages},
        queue::{JobQueue, RedisJobQueue},
        script::OpenAiScriptWriter,
        slides::ImageSlideRenderer,
        speech::GoogleSpeechSynthesizer,
        storage,
        worker::Worker,
    },
    signal,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting onboarding video worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Serve worker metrics on a dedicated scrape port
    let metrics_addr: std::net::SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("Invalid worker metrics address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    routes::metrics::describe_metrics();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool));

    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::new(&config.redis_url, &config.queue_name)
            .expect("Failed to initialize job queue"),
    );

    // Initialize pipeline collaborators
    tracing::info!("Initializing services");
    let credentials = config
        .vendor_credentials()
        .expect("Missing vendor credentials");
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .expect("Failed to build HTTP client");

    let stages = Stages {
        script: Arc::new(OpenAiScriptWriter::new(
            http.clone(),
            credentials.openai_api_key.to_string(),
            config.openai_model.clone(),
        )),
        speech: Arc::new(GoogleSpeechSynthesizer::new(
            http.clone(),
            credentials.google_tts_api_key.to_string(),
            config.ffprobe_path.clone(),
        )),
        slides: Arc::new(ImageSlideRenderer::new()),
        composer: Arc::new(FfmpegComposer::new(
            config.ffmpeg_path.clone(),
            config.font_path.clone(),
        )),
        notifier: Arc::new(SendGridNotifier::new(
            http,
            credentials.sendgrid_api_key.to_string(),
            credentials.from_email.to_string(),
            config.base_url.clone(),
        )),
    };

    let artifacts = storage::artifact_store(&config).expect("Failed to initialize video storage");
    let pipeline = Arc::new(Pipeline::new(
        stages,
        artifacts,
        config.retry_policy(),
        config.temp_dir.clone(),
    ));

    // Entries still in flight were dequeued by a worker that never acked them.
    match queue.recover().await {
        Ok(0) => {}
        Ok(moved) => tracing::warn!(moved, "Returned unacknowledged jobs to the queue"),
        Err(e) => tracing::error!(error = %e, "Failed to recover in-flight jobs"),
    }

    let shutdown = signal::shutdown();
    let concurrency = config.worker_concurrency.max(1);
    tracing::info!(concurrency, "Worker ready, starting job processing loops");

    let mut loops = tokio::task::JoinSet::new();
    for _ in 0..concurrency {
        let worker = Worker::new(
            store.clone(),
            queue.clone(),
            pipeline.clone(),
            config.job_timeout(),
            config.dequeue_timeout(),
        );
        let shutdown = shutdown.clone();
        loops.spawn(async move { worker.run(shutdown).await });
    }

    while let Some(result) = loops.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker loop panicked");
        }
    }

    tracing::info!("All worker loops stopped");
}
