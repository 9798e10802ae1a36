use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::ApiError;
use crate::app_state::AppState;
use crate::models::api::StatusResponse;
use crate::models::JobPhase;
use crate::store::fields;

const PENDING: &str = "pending";

async fn status_of(
    state: &AppState,
    job_id: String,
    field: &str,
) -> Result<StatusResponse, ApiError> {
    let status = state
        .store
        .get(&job_id, field)
        .await?
        .unwrap_or_else(|| PENDING.to_string());
    let terminal = status
        .parse::<JobPhase>()
        .is_ok_and(|phase| phase.is_terminal());
    Ok(StatusResponse {
        job_id,
        status,
        terminal,
    })
}

/// GET /api/status/{job_id}: progress label of the main chain.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(status_of(&state, job_id, fields::STATE).await?))
}

/// GET /api/status/{job_id}/{branch}: progress of the `ai` or
/// `plagiarism` branch.
pub async fn branch_status(
    State(state): State<AppState>,
    Path((job_id, branch)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let field = match branch.as_str() {
        "ai" => fields::AI_ANALYZE_STATUS,
        "plagiarism" => fields::PLAGIARISM_CHECK_STATUS,
        other => return Err(ApiError::NotFound(format!("unknown branch '{other}'"))),
    };
    Ok(Json(status_of(&state, job_id, field).await?))
}

/// GET /api/jobs/{job_id}/result: the job document as JSON.
pub async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let raw = state
        .store
        .get(&job_id, fields::JOB_DATA)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no results for job {job_id}")))?;

    match serde_json::from_str(&raw) {
        Ok(document) => Ok(Json(document)),
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Stored job_data is not valid JSON");
            Ok(Json(json!({ "raw": raw })))
        }
    }
}

/// GET /api/jobs/{job_id}: every stored field of the job.
pub async fn job_fields(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let snapshot = state.store.scan_all(&job_id).await?;
    if snapshot.is_empty() {
        return Err(ApiError::NotFound(format!("unknown job {job_id}")));
    }
    Ok(Json(snapshot))
}
