use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ensure_success, AdapterError};
use crate::models::{JobDocument, Record, StageKind};
use crate::pipeline::{gather_ordered, StageError, StageOutcome, StageProcessor};

/// Verdict from an authorship classifier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    pub label: Option<String>,
    pub score: Option<f64>,
}

#[async_trait]
pub trait TextClassifier: Send + Sync + 'static {
    async fn classify(&self, text: &str) -> Result<Classification, AdapterError>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    input: &'a str,
}

/// Classifier behind a bearer-authenticated JSON endpoint.
pub struct HttpTextClassifier {
    http: Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl HttpTextClassifier {
    pub fn new(http: Client, api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl TextClassifier for HttpTextClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, AdapterError> {
        let url = self
            .api_url
            .as_deref()
            .ok_or(AdapterError::NotConfigured("CLASSIFIER_API_URL"))?;
        let mut request = self.http.post(url).json(&ClassifyRequest { input: text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

/// Branch stage: labels each extracted text as human or machine written.
pub struct ClassifyStage {
    classifier: Arc<dyn TextClassifier>,
    record_concurrency: usize,
}

impl ClassifyStage {
    pub fn new(classifier: Arc<dyn TextClassifier>, record_concurrency: usize) -> Self {
        Self {
            classifier,
            record_concurrency,
        }
    }

    async fn classify_record(
        &self,
        job_id: &str,
        index: usize,
        record: &Record,
    ) -> Option<Classification> {
        let text = record.text()?;
        match self.classifier.classify(text).await {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(job_id = %job_id, record = index, error = %e, "Classification failed");
                None
            }
        }
    }
}

#[async_trait]
impl StageProcessor for ClassifyStage {
    fn kind(&self) -> StageKind {
        StageKind::Classify
    }

    async fn process(&self, job: &mut JobDocument) -> Result<StageOutcome, StageError> {
        let job_id = job.job_id.as_str();
        let verdicts = gather_ordered(&job.results, self.record_concurrency, |index, record| {
            self.classify_record(job_id, index, record)
        })
        .await;

        let mut labelled = 0;
        for (record, verdict) in job.results.iter_mut().zip(verdicts) {
            // Skipped or failed records keep whatever they had.
            if let Some(verdict) = verdict {
                record.ai_label = verdict.label;
                record.ai_score = verdict.score;
                labelled += 1;
            }
        }
        tracing::info!(job_id = %job.job_id, labelled, "Classification complete");
        Ok(StageOutcome::Forward)
    }

    fn merge(&self, latest: &mut Record, processed: &Record) {
        latest.ai_label = processed.ai_label.clone();
        latest.ai_score = processed.ai_score;
    }
}
