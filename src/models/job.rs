use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One harvested publication, enriched additively stage by stage.
///
/// Fields owned by a stage are only ever written by that stage; unknown
/// fields supplied by an upstream adapter ride along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    // Harvest
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "citations")]
    pub citation_count: Option<u64>,

    // Identity resolution
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub open_access: bool,

    // Content extraction
    #[serde(default, rename = "text")]
    pub extracted_text: Option<String>,

    // Classification
    #[serde(default)]
    pub ai_label: Option<String>,
    #[serde(default)]
    pub ai_score: Option<f64>,

    // Originality check
    #[serde(default)]
    pub originality_report: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    /// Extracted text, if present and not blank.
    pub fn text(&self) -> Option<&str> {
        self.extracted_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// The document threaded through the queues and mirrored in the store
/// under the `job_data` field.
///
/// Intake messages (`{job_id, author}`) and pointer messages (`{job_id}`)
/// deserialize into the same shape with empty defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    pub job_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub results: Vec<Record>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobDocument {
    pub fn new(job_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    /// Copy fields owned by the current stage from `processed` onto this
    /// document, matching records by position.
    ///
    /// Records present here but missing from `processed` are left as they
    /// are; surplus processed records are ignored.
    pub fn merge_by_index<F>(&mut self, processed: &JobDocument, mut merge: F)
    where
        F: FnMut(&mut Record, &Record),
    {
        for (latest, source) in self.results.iter_mut().zip(processed.results.iter()) {
            merge(latest, source);
        }
    }
}

/// Message published by the intake API onto the harvest queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub job_id: String,
    pub author: String,
}

/// Message used once a stage has handed the document off through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPointer {
    pub job_id: String,
}
