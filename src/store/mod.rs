//! Per-job field store.
//!
//! Every job owns a flat `field -> string` mapping. Callers agree on field
//! names out-of-band (see [`fields`]); the store enforces no schema, never
//! retries, and never caches. Read-modify-write callers go through
//! [`JobStateStore::compare_and_set`].

use std::collections::BTreeMap;

use async_trait::async_trait;

mod memory;
mod redis_store;

pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;

/// Well-known field names shared across stages.
pub mod fields {
    pub const STATE: &str = "state";
    pub const JOB_DATA: &str = "job_data";
    pub const AUTHOR: &str = "author";
    pub const SUBMITTED_AT: &str = "submitted_at";
    pub const AI_ANALYZE_STATUS: &str = "ai_analyze_status";
    pub const PLAGIARISM_CHECK_STATUS: &str = "plagiarism_check_status";
}

/// Key under which `(job_id, field)` is stored.
pub fn field_key(job_id: &str, field: &str) -> String {
    format!("job:{job_id}:{field}")
}

#[async_trait]
pub trait JobStateStore: Send + Sync + 'static {
    /// Persist `value` under `(job_id, field)`, replacing any prior value.
    async fn set(&self, job_id: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Current value, or `None` if the field was never written.
    async fn get(&self, job_id: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` only if the field still holds `expected` (`None`:
    /// still unset). Returns whether the write happened.
    async fn compare_and_set(
        &self,
        job_id: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, job_id: &str, field: &str) -> Result<(), StoreError>;

    /// Best-effort snapshot of every field of a job. Concurrent writes may
    /// or may not be reflected.
    async fn scan_all(&self, job_id: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Check connectivity (for health checks).
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
