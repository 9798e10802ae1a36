//! Shared fakes for the pipeline integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scholar_pipeline::broker::{BrokerError, MemoryTransport, Publisher, QueueTransport};
use scholar_pipeline::config::QueueNames;
use scholar_pipeline::models::{JobDocument, Record};
use scholar_pipeline::pipeline::{StageDriver, StageProcessor, StageRoute};
use scholar_pipeline::services::harvest::PublicationSource;
use scholar_pipeline::services::resolver::{BibliographicIndex, Candidate};
use scholar_pipeline::services::unpaywall::OpenAccessLookup;
use scholar_pipeline::services::AdapterError;
use scholar_pipeline::store::{fields, JobStateStore, MemoryJobStore, StoreError};

/// In-memory store and broker wired the way a worker wires Redis.
pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub transport: Arc<MemoryTransport>,
    pub queues: QueueNames,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryJobStore::new()),
            transport: Arc::new(MemoryTransport::new()),
            queues: QueueNames::default(),
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.transport.clone())
    }

    pub fn driver<P: StageProcessor>(&self, processor: P) -> StageDriver<P> {
        let route = StageRoute::for_stage(processor.kind(), &self.queues);
        StageDriver::new(processor, self.store.clone(), self.publisher(), route)
    }

    pub async fn field(&self, job_id: &str, field: &str) -> Option<String> {
        self.store.get(job_id, field).await.unwrap()
    }

    pub async fn job_data(&self, job_id: &str) -> JobDocument {
        let raw = self.field(job_id, fields::JOB_DATA).await.expect("job_data written");
        serde_json::from_str(&raw).unwrap()
    }

    pub async fn seed_job_data(&self, document: &JobDocument) {
        self.store
            .set(
                &document.job_id,
                fields::JOB_DATA,
                &serde_json::to_string(document).unwrap(),
            )
            .await
            .unwrap();
    }
}

/// Store that refuses writes to one field and delegates everything else.
pub struct FieldFailingStore {
    pub inner: MemoryJobStore,
    pub failing_field: &'static str,
}

#[async_trait]
impl JobStateStore for FieldFailingStore {
    async fn set(&self, job_id: &str, field: &str, value: &str) -> Result<(), StoreError> {
        if field == self.failing_field {
            return Err(StoreError::Unavailable(format!("write to {field} refused")));
        }
        self.inner.set(job_id, field, value).await
    }

    async fn get(&self, job_id: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(job_id, field).await
    }

    async fn compare_and_set(
        &self,
        job_id: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StoreError> {
        if field == self.failing_field {
            return Err(StoreError::Unavailable(format!("write to {field} refused")));
        }
        self.inner.compare_and_set(job_id, field, expected, value).await
    }

    async fn delete(&self, job_id: &str, field: &str) -> Result<(), StoreError> {
        self.inner.delete(job_id, field).await
    }

    async fn scan_all(&self, job_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.inner.scan_all(job_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Store whose `job_data` writes stall for `delay`, widening the window
/// between a stage re-reading the document and writing it back.
pub struct SlowJobDataStore {
    pub inner: MemoryJobStore,
    pub delay: Duration,
}

impl SlowJobDataStore {
    async fn stall(&self, field: &str) {
        if field == fields::JOB_DATA {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl JobStateStore for SlowJobDataStore {
    async fn set(&self, job_id: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.stall(field).await;
        self.inner.set(job_id, field, value).await
    }

    async fn get(&self, job_id: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(job_id, field).await
    }

    async fn compare_and_set(
        &self,
        job_id: &str,
        field: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.stall(field).await;
        self.inner.compare_and_set(job_id, field, expected, value).await
    }

    async fn delete(&self, job_id: &str, field: &str) -> Result<(), StoreError> {
        self.inner.delete(job_id, field).await
    }

    async fn scan_all(&self, job_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.inner.scan_all(job_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Transport that notes, on every push, whether the job's `job_data` was
/// already persisted at that moment.
pub struct PersistCheckingTransport {
    pub inner: MemoryTransport,
    pub store: Arc<MemoryJobStore>,
    pub job_id: String,
    pub saw_unpersisted_push: AtomicBool,
}

#[async_trait]
impl QueueTransport for PersistCheckingTransport {
    async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        self.inner.declare(queue).await
    }

    async fn push(&self, queue: &str, message: String) -> Result<(), BrokerError> {
        let persisted = self
            .store
            .get(&self.job_id, fields::JOB_DATA)
            .await
            .ok()
            .flatten()
            .is_some();
        if !persisted {
            self.saw_unpersisted_push.store(true, Ordering::SeqCst);
        }
        self.inner.push(queue, message).await
    }

    async fn fetch(
        &self,
        queue: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<String>, BrokerError> {
        self.inner.fetch(queue, consumer, wait).await
    }

    async fn ack(&self, queue: &str, consumer: &str, message: &str) -> Result<(), BrokerError> {
        self.inner.ack(queue, consumer, message).await
    }

    async fn recover(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        self.inner.recover(queue, consumer).await
    }

    async fn depth(&self, queue: &str) -> Result<u64, BrokerError> {
        self.inner.depth(queue).await
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.inner.ping().await
    }
}

/// Publication source returning a fixed list, or failing.
pub struct StaticSource(pub Result<Vec<Record>, ()>);

#[async_trait]
impl PublicationSource for StaticSource {
    async fn fetch_publications(&self, _author: &str) -> Result<Vec<Record>, AdapterError> {
        self.0
            .clone()
            .map_err(|_| AdapterError::Response("harvester unavailable".into()))
    }
}

/// Bibliographic index keyed by the exact queried title. Titles listed in
/// `down` fail as if the index timed out.
#[derive(Default)]
pub struct FakeIndex {
    pub candidates: HashMap<String, Vec<Candidate>>,
    pub citations: HashMap<String, u64>,
    pub down: Vec<String>,
    pub searches: Mutex<Vec<String>>,
}

#[async_trait]
impl BibliographicIndex for FakeIndex {
    async fn search(
        &self,
        title: &str,
        _author: &str,
        rows: usize,
    ) -> Result<Vec<Candidate>, AdapterError> {
        self.searches.lock().unwrap().push(title.to_string());
        if self.down.iter().any(|t| t == title) {
            return Err(AdapterError::Response("index timed out".into()));
        }
        let mut found = self.candidates.get(title).cloned().unwrap_or_default();
        found.truncate(rows);
        Ok(found)
    }

    async fn citation_count(&self, identifier: &str) -> Result<Option<u64>, AdapterError> {
        Ok(self.citations.get(identifier).copied())
    }
}

/// Open-access lookup answering from a fixed set of DOIs.
pub struct FixedOpenAccess(pub Vec<&'static str>);

#[async_trait]
impl OpenAccessLookup for FixedOpenAccess {
    async fn is_open_access(&self, doi: &str) -> Result<bool, AdapterError> {
        Ok(self.0.contains(&doi))
    }
}

pub fn candidate(id: &str, title: &str, authors: &[&str]) -> Candidate {
    Candidate {
        identifier: id.to_string(),
        title: title.to_string(),
        authors: authors.iter().map(|a| a.to_string()).collect(),
    }
}

pub fn record_with(text: Option<&str>, doi: Option<&str>) -> Record {
    let mut record = Record::titled("T");
    record.extracted_text = text.map(str::to_string);
    record.doi = doi.map(str::to_string);
    record.verified = doi.is_some();
    record.open_access = doi.is_some();
    record
}
