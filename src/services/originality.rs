use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::crossref::CrossrefClient;
use super::{ensure_success, AdapterError};
use crate::models::{JobDocument, Record, StageKind};
use crate::pipeline::{gather_ordered, StageError, StageOutcome, StageProcessor};

/// Words sent to the originality service per record.
pub const SNIPPET_WORDS: usize = 30;

/// Originality report for a text sample taken from the work behind `doi`.
#[async_trait]
pub trait OriginalityChecker: Send + Sync + 'static {
    async fn check(&self, doi: &str, snippet: &str) -> Result<Value, AdapterError>;
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    text: &'a str,
    excluded_sources: &'a [String],
    language: &'a str,
    country: &'a str,
}

/// Checker behind a bearer-authenticated JSON endpoint. The work's own
/// Crossref links are excluded so it does not match itself.
pub struct HttpOriginalityChecker {
    http: Client,
    crossref: CrossrefClient,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl HttpOriginalityChecker {
    pub fn new(
        http: Client,
        crossref: CrossrefClient,
        api_url: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            crossref,
            api_url,
            api_key,
        }
    }

    async fn excluded_sources(&self, doi: &str) -> Vec<String> {
        match self.crossref.work(doi).await {
            Ok(work) => work.link_urls(),
            Err(e) => {
                tracing::warn!(doi = %doi, error = %e, "No Crossref links, checking without exclusions");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl OriginalityChecker for HttpOriginalityChecker {
    async fn check(&self, doi: &str, snippet: &str) -> Result<Value, AdapterError> {
        let url = self
            .api_url
            .as_deref()
            .ok_or(AdapterError::NotConfigured("ORIGINALITY_API_URL"))?;
        let excluded = self.excluded_sources(doi).await;
        let body = CheckRequest {
            text: snippet,
            excluded_sources: &excluded,
            language: "en",
            country: "us",
        };
        let mut request = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

/// Drops literal `\uXXXX` escape sequences left over from PDF extraction.
fn strip_unicode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 2..];
        let is_escape = tail.len() >= 4 && tail.as_bytes()[..4].iter().all(u8::is_ascii_hexdigit);
        if is_escape {
            rest = &tail[4..];
        } else {
            out.push_str("\\u");
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

/// Up to `word_count` words from the middle of `text`, or `None` when
/// nothing usable remains.
pub fn extract_snippet(text: &str, word_count: usize) -> Option<String> {
    let cleaned = strip_unicode_escapes(text);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let window = if words.len() < word_count {
        &words[..]
    } else {
        let start = (words.len() / 2).saturating_sub(word_count / 2);
        let end = (start + word_count).min(words.len());
        &words[start..end]
    };
    let snippet = window.join(" ").replace("\\u", "");
    let snippet = snippet.trim();
    (!snippet.is_empty()).then(|| snippet.to_string())
}

/// Branch stage: attaches an originality report to each record with text
/// and a DOI. Every other record gets an explicit null report.
pub struct OriginalityStage {
    checker: Arc<dyn OriginalityChecker>,
    record_concurrency: usize,
}

impl OriginalityStage {
    pub fn new(checker: Arc<dyn OriginalityChecker>, record_concurrency: usize) -> Self {
        Self {
            checker,
            record_concurrency,
        }
    }

    async fn check_record(&self, job_id: &str, record: &Record) -> Option<Value> {
        let (text, doi) = (record.text()?, record.doi.as_deref()?);
        let Some(snippet) = extract_snippet(text, SNIPPET_WORDS) else {
            tracing::warn!(job_id = %job_id, doi = %doi, "No usable snippet, skipping check");
            return None;
        };
        match self.checker.check(doi, &snippet).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(job_id = %job_id, doi = %doi, error = %e, "Originality check failed");
                None
            }
        }
    }
}

#[async_trait]
impl StageProcessor for OriginalityStage {
    fn kind(&self) -> StageKind {
        StageKind::Originality
    }

    async fn process(&self, job: &mut JobDocument) -> Result<StageOutcome, StageError> {
        let job_id = job.job_id.as_str();
        let reports = gather_ordered(&job.results, self.record_concurrency, |_, record| {
            self.check_record(job_id, record)
        })
        .await;

        let checked = reports.iter().filter(|r| r.is_some()).count();
        for (record, report) in job.results.iter_mut().zip(reports) {
            record.originality_report = report;
        }
        tracing::info!(job_id = %job.job_id, checked, "Originality check complete");
        Ok(StageOutcome::Forward)
    }

    fn merge(&self, latest: &mut Record, processed: &Record) {
        latest.originality_report = processed.originality_report.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_snippet_is_taken_from_the_middle() {
        let text = (0..100).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let snippet = extract_snippet(&text, 30).unwrap();
        let words: Vec<&str> = snippet.split(' ').collect();
        assert_eq!(words.len(), 30);
        assert_eq!(words[0], "w35");
        assert_eq!(words[29], "w64");
    }

    #[test]
    fn test_short_text_is_used_whole() {
        assert_eq!(
            extract_snippet("  only a few\nwords ", 30).as_deref(),
            Some("only a few words")
        );
    }

    #[test]
    fn test_unicode_escapes_are_stripped() {
        assert_eq!(
            extract_snippet("caf\\u00e9 na\\u00EFve \\u20", 30).as_deref(),
            Some("caf nave 20")
        );
        assert_eq!(extract_snippet("\\u2019 \\u201c", 30), None);
        assert_eq!(extract_snippet("", 30), None);
    }

    struct RecordingChecker {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OriginalityChecker for RecordingChecker {
        async fn check(&self, doi: &str, snippet: &str) -> Result<Value, AdapterError> {
            self.seen
                .lock()
                .unwrap()
                .push((doi.to_string(), snippet.to_string()));
            if doi == "10.1/down" {
                return Err(AdapterError::Response("unavailable".into()));
            }
            Ok(json!({"score": 7}))
        }
    }

    fn record(text: Option<&str>, doi: Option<&str>) -> Record {
        let mut record = Record::titled("T");
        record.extracted_text = text.map(str::to_string);
        record.doi = doi.map(str::to_string);
        record
    }

    #[tokio::test]
    async fn test_reports_only_for_records_with_text_and_doi() {
        let checker = Arc::new(RecordingChecker {
            seen: Mutex::new(Vec::new()),
        });
        let stage = OriginalityStage::new(checker.clone(), 4);
        let mut job = JobDocument::new("j", "A");
        job.results = vec![
            record(Some("some words"), Some("10.1/a")),
            record(None, Some("10.1/b")),
            record(Some("text"), None),
            record(Some("more words"), Some("10.1/down")),
        ];
        job.results[1].originality_report = Some(json!({"stale": true}));

        stage.process(&mut job).await.unwrap();

        assert_eq!(job.results[0].originality_report, Some(json!({"score": 7})));
        assert_eq!(job.results[1].originality_report, None);
        assert_eq!(job.results[2].originality_report, None);
        assert_eq!(job.results[3].originality_report, None);

        let mut seen = checker.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("10.1/a".to_string(), "some words".to_string()),
                ("10.1/down".to_string(), "more words".to_string()),
            ]
        );
    }
}
