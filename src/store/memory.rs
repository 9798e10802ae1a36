use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{JobStateStore, StoreError};

/// In-process store used by tests and single-machine runs.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, BTreeMap<String, String>>>,
    offline: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing the backing store: every call fails until restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStateStore for MemoryJobStore {
    async fn set(&self, job_id: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.jobs
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, job_id: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        Ok(self
            .jobs
            .read()
            .await
            .get(job_id)
            .and_then(|fields| fields.get(field).cloned()))
    }

    async fn compare_and_set(
        &self,
        job_id: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        let fields = jobs.entry(job_id.to_string()).or_default();
        if fields.get(field).map(String::as_str) != expected {
            return Ok(false);
        }
        fields.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, job_id: &str, field: &str) -> Result<(), StoreError> {
        self.check_online()?;
        if let Some(fields) = self.jobs.write().await.get_mut(job_id) {
            fields.remove(field);
        }
        Ok(())
    }

    async fn scan_all(&self, job_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.check_online()?;
        Ok(self.jobs.read().await.get(job_id).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}
