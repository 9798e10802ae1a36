//! Logging and metrics setup shared by the gateway and the stage workers.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// JSON logs filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Install the Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

/// Install the recorder behind its own scrape listener (workers have no
/// HTTP surface of their own). Must be called from within a tokio runtime.
pub fn install_listener(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(
        "pipeline_jobs_submitted_total",
        "Jobs accepted by the intake API"
    );
    metrics::describe_counter!(
        "pipeline_messages_published_total",
        "Messages published, by queue"
    );
    metrics::describe_counter!(
        "pipeline_messages_processed_total",
        "Messages a stage finished successfully"
    );
    metrics::describe_counter!(
        "pipeline_messages_failed_total",
        "Messages whose stage ended in an error label"
    );
    metrics::describe_counter!(
        "pipeline_messages_discarded_total",
        "Messages dropped for lacking a job_id"
    );
    metrics::describe_counter!(
        "pipeline_messages_rejected_total",
        "Deliveries whose handler returned an error, by queue"
    );
    metrics::describe_counter!(
        "pipeline_records_resolved_total",
        "Records run through identity resolution, by verified flag"
    );
    metrics::describe_histogram!(
        "pipeline_stage_seconds",
        metrics::Unit::Seconds,
        "Time a stage spent on one job"
    );
}
