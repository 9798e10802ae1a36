use serde::Deserialize;

use crate::models::phase::StageKind;
use crate::services::similarity::SimilarityScorer;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Gateway bind address (e.g., "0.0.0.0:3000"). Ignored by workers.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the job state store
    pub redis_url: String,

    /// Redis connection string for the durable queues. Defaults to `redis_url`.
    pub broker_url: Option<String>,

    /// Stage a worker process runs (harvest, resolve, extract, classify, originality)
    pub pipeline_stage: Option<StageKind>,

    /// Consumer identity; owns the processing list unacked messages park in
    pub consumer_name: Option<String>,

    /// Maximum unacknowledged deliveries per worker process
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: usize,

    /// Records processed in parallel within one job
    #[serde(default = "default_record_concurrency")]
    pub record_concurrency: usize,

    /// Minimum title similarity (0-100) for a candidate to be considered
    #[serde(default = "default_title_threshold")]
    pub title_sim_threshold: f64,

    /// Minimum author similarity (0-100) for a candidate to be accepted
    #[serde(default = "default_author_threshold")]
    pub author_sim_threshold: f64,

    #[serde(default)]
    pub similarity_scorer: SimilarityScorer,

    /// Candidates requested from the bibliographic index per record
    #[serde(default = "default_candidate_rows")]
    pub candidate_rows: usize,

    #[serde(default = "default_crossref_api_url")]
    pub crossref_api_url: String,

    #[serde(default)]
    pub crossref_mailto: String,

    #[serde(default = "default_unpaywall_api_url")]
    pub unpaywall_api_url: String,

    #[serde(default)]
    pub unpaywall_email: String,

    /// Comma-separated publication harvester base URLs, tried in order
    #[serde(default = "default_harvest_api_url")]
    pub harvest_api_url: String,

    pub classifier_api_url: Option<String>,
    pub classifier_api_key: Option<String>,

    pub originality_api_url: Option<String>,
    pub originality_api_key: Option<String>,

    /// Timeout applied to every outbound HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_scrape_queue")]
    pub scrape_queue: String,
    #[serde(default = "default_resolve_queue")]
    pub resolve_queue: String,
    #[serde(default = "default_extract_queue")]
    pub extract_queue: String,
    #[serde(default = "default_classify_queue")]
    pub classify_queue: String,
    #[serde(default = "default_originality_queue")]
    pub originality_queue: String,

    /// When set, messages whose handler failed are copied here before ack
    pub dead_letter_queue: Option<String>,

    /// Expiry applied to every job state field; unset keeps fields forever
    pub job_ttl_seconds: Option<u64>,

    /// Prometheus scrape listener for worker processes
    pub metrics_addr: Option<String>,
}

/// Names of the fixed queue chain.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueNames {
    pub scrape: String,
    pub resolve: String,
    pub extract: String,
    pub classify: String,
    pub originality: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            scrape: default_scrape_queue(),
            resolve: default_resolve_queue(),
            extract: default_extract_queue(),
            classify: default_classify_queue(),
            originality: default_originality_queue(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_prefetch_count() -> usize {
    1
}

fn default_record_concurrency() -> usize {
    4
}

fn default_title_threshold() -> f64 {
    60.0
}

fn default_author_threshold() -> f64 {
    75.0
}

fn default_candidate_rows() -> usize {
    5
}

fn default_crossref_api_url() -> String {
    "https://api.crossref.org/works".to_string()
}

fn default_unpaywall_api_url() -> String {
    "https://api.unpaywall.org/v2".to_string()
}

fn default_harvest_api_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_scrape_queue() -> String {
    "scrape_requests".to_string()
}

fn default_resolve_queue() -> String {
    "doi-resolve-requests".to_string()
}

fn default_extract_queue() -> String {
    "text-extract-requests".to_string()
}

fn default_classify_queue() -> String {
    "ai-detection-requests".to_string()
}

fn default_originality_queue() -> String {
    "plagiarism-detection-requests".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("TITLE_SIM_THRESHOLD", self.title_sim_threshold),
            ("AUTHOR_SIM_THRESHOLD", self.author_sim_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within 0-100, got {value}"
                )));
            }
        }
        if self.prefetch_count == 0 {
            return Err(ConfigError::Invalid("PREFETCH_COUNT must be at least 1".into()));
        }
        if self.candidate_rows == 0 {
            return Err(ConfigError::Invalid("CANDIDATE_ROWS must be at least 1".into()));
        }
        Ok(())
    }

    pub fn broker_url(&self) -> &str {
        self.broker_url.as_deref().unwrap_or(&self.redis_url)
    }

    pub fn queues(&self) -> QueueNames {
        QueueNames {
            scrape: self.scrape_queue.clone(),
            resolve: self.resolve_queue.clone(),
            extract: self.extract_queue.clone(),
            classify: self.classify_queue.clone(),
            originality: self.originality_queue.clone(),
        }
    }

    pub fn consumer_name(&self, stage: StageKind) -> String {
        self.consumer_name
            .clone()
            .unwrap_or_else(|| format!("{stage}-0"))
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }

    pub fn harvest_api_urls(&self) -> Vec<String> {
        self.harvest_api_url
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
