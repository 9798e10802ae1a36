use axum::extract::{Query, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use super::ApiError;
use crate::app_state::AppState;
use crate::models::api::{ScanRequest, ScanResponse};
use crate::models::{JobPhase, ScrapeRequest};
use crate::services::similarity::normalize;
use crate::store::fields;

/// POST /api/scan?author=: start a pipeline run for one author.
pub async fn submit_scan(
    State(state): State<AppState>,
    Query(request): Query<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let author = request.author.trim().to_string();
    ScanRequest {
        author: author.clone(),
    }
    .validate()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if normalize(&author).is_empty() {
        return Err(ApiError::BadRequest(
            "author: must contain at least one letter or digit".to_string(),
        ));
    }

    let job_id = Uuid::new_v4().simple().to_string();
    let submitted_at = chrono::Utc::now().to_rfc3339();

    state.store.set(&job_id, fields::AUTHOR, &author).await?;
    state
        .store
        .set(&job_id, fields::SUBMITTED_AT, &submitted_at)
        .await?;
    state
        .store
        .set(&job_id, fields::STATE, JobPhase::Queued.label())
        .await?;

    let message = ScrapeRequest {
        job_id: job_id.clone(),
        author,
    };
    if let Err(e) = state.publisher.publish(&state.queues.scrape, &message).await {
        tracing::error!(job_id = %job_id, error = %e, "Failed to publish scrape request");
        return Err(e.into());
    }

    metrics::counter!("pipeline_jobs_submitted_total").increment(1);
    tracing::info!(job_id = %job_id, author = %message.author, "Scan job submitted");

    Ok(Json(ScanResponse { job_id }))
}
