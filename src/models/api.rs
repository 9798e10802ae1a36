use garde::Validate;
use serde::{Deserialize, Serialize};

/// Query string of `POST /api/scan`.
#[derive(Debug, Deserialize, Validate)]
pub struct ScanRequest {
    #[garde(length(min = 1, max = 200))]
    pub author: String,
}

/// Response after submitting a scan job.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub job_id: String,
}

/// Response for querying a job's status field.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: String,
    /// No later phase will be written to this status field.
    pub terminal: bool,
}
