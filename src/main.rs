use std::sync::Arc;

use scholar_pipeline::{
    app_state::AppState,
    broker::{Publisher, RedisTransport},
    config::AppConfig,
    routes,
    store::RedisJobStore,
    telemetry,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing scholar-pipeline gateway");

    // Initialize Prometheus metrics recorder
    let prometheus_handle =
        Arc::new(telemetry::install_recorder().expect("Failed to install Prometheus metrics recorder"));

    // Initialize Redis job state store
    tracing::info!("Connecting to Redis job state store");
    let store = Arc::new(
        RedisJobStore::connect(&config.redis_url, config.job_ttl_seconds)
            .await
            .expect("Failed to connect to job state store"),
    );

    // Initialize queue transport
    tracing::info!("Connecting to queue transport");
    let transport = Arc::new(
        RedisTransport::connect(config.broker_url())
            .await
            .expect("Failed to connect to queue transport"),
    );

    // Create shared application state
    let state = AppState::new(
        store.clone(),
        Publisher::new(transport.clone()),
        config.queues(),
    );

    // Build API routes with middleware
    let app = routes::router(state, prometheus_handle)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    // Release connections once in-flight requests have finished
    if let Ok(store) = Arc::try_unwrap(store) {
        store.close().await;
    }
    if let Ok(transport) = Arc::try_unwrap(transport) {
        transport.close().await;
    }
}
