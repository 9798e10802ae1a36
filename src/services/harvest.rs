use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, AdapterError};
use crate::models::{JobDocument, JobPhase, Record, StageKind};
use crate::pipeline::{StageError, StageOutcome, StageProcessor};

/// Source of an author's publication list.
#[async_trait]
pub trait PublicationSource: Send + Sync + 'static {
    async fn fetch_publications(&self, author: &str) -> Result<Vec<Record>, AdapterError>;
}

#[derive(Deserialize)]
struct HarvestResponse {
    #[serde(default)]
    results: Vec<Record>,
}

/// Calls one or more harvester services (`GET {base}/scrape?author=`),
/// falling back to the next base URL when one fails.
pub struct HttpPublicationSource {
    http: Client,
    base_urls: Vec<String>,
}

impl HttpPublicationSource {
    pub fn new(http: Client, base_urls: Vec<String>) -> Self {
        Self {
            http,
            base_urls: base_urls
                .into_iter()
                .map(|url| url.trim_end_matches('/').to_string())
                .collect(),
        }
    }

    async fn fetch_from(&self, base_url: &str, author: &str) -> Result<Vec<Record>, AdapterError> {
        let response = self
            .http
            .get(format!("{base_url}/scrape"))
            .query(&[("author", author)])
            .send()
            .await?;
        let body: HarvestResponse = ensure_success(response).await?.json().await?;
        Ok(body.results)
    }
}

#[async_trait]
impl PublicationSource for HttpPublicationSource {
    async fn fetch_publications(&self, author: &str) -> Result<Vec<Record>, AdapterError> {
        let mut last_error = AdapterError::NotConfigured("HARVEST_API_URL");
        for base_url in &self.base_urls {
            match self.fetch_from(base_url, author).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    tracing::warn!(harvester = %base_url, error = %e, "Harvester failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// First stage: turns an author name into a list of publication records.
pub struct HarvestStage {
    source: Arc<dyn PublicationSource>,
}

impl HarvestStage {
    pub fn new(source: Arc<dyn PublicationSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl StageProcessor for HarvestStage {
    fn kind(&self) -> StageKind {
        StageKind::Harvest
    }

    async fn process(&self, job: &mut JobDocument) -> Result<StageOutcome, StageError> {
        let author = job.author.trim();
        if author.is_empty() {
            return Err(StageError::Upstream(AdapterError::Response(
                "scrape request has no author".into(),
            )));
        }

        // The whole job depends on this one call, so its failure is a
        // stage failure rather than a per-record one.
        let records = self.source.fetch_publications(author).await?;
        tracing::info!(job_id = %job.job_id, author = %author, papers = records.len(), "Harvest complete");

        job.results = records;
        if job.results.is_empty() {
            return Ok(StageOutcome::Halt(JobPhase::HarvestEmpty));
        }
        Ok(StageOutcome::Forward)
    }
}
