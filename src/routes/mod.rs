//! HTTP surface of the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::app_state::AppState;
use crate::broker::BrokerError;
use crate::store::StoreError;

pub mod ops;
pub mod scan;
pub mod status;

/// All gateway routes. Middleware layers are added by the binary.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(ops::health_check))
        .route("/healthz", get(ops::liveness))
        .route("/api/scan", post(scan::submit_scan))
        .route("/api/status/{job_id}", get(status::job_status))
        .route("/api/status/{job_id}/{branch}", get(status::branch_status))
        .route("/api/jobs/{job_id}", get(status::job_fields))
        .route("/api/jobs/{job_id}/result", get(status::job_result))
        .with_state(state)
        .route(
            "/metrics",
            get(ops::prometheus_metrics).with_state(prometheus),
        )
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Broker(_) => {
                tracing::error!(error = %self, "Request failed on a backing service");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
