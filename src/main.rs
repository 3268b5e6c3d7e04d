use metrics_exporter_prometheus::PrometheusBuilder;
use preboarding_service::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries::PgJobStore},
    routes,
    services::{queue::RedisJobQueue, storage},
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

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing preboarding webhook server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = RedisJobQueue::new(&config.redis_url, &config.queue_name)
        .expect("Failed to initialize job queue");

    let artifacts = storage::artifact_store(&config).expect("Failed to initialize video storage");

    let state = AppState::new(Arc::new(PgJobStore::new(db_pool)), Arc::new(queue), artifacts);
    let app = routes::router(state, Some(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(signal::shutdown().cancelled_owned())
        .await
        .expect("Server error");

    tracing::info!("Server stopped");
}
