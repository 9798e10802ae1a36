use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};

use super::crossref::CrossrefClient;
use super::unpaywall::UnpaywallClient;
use super::{ensure_success, AdapterError};
use crate::models::{JobDocument, Record, StageKind};
use crate::pipeline::{gather_ordered, StageError, StageOutcome, StageProcessor};

/// Full text of an open-access work.
#[async_trait]
pub trait TextSource: Send + Sync + 'static {
    /// `Ok(None)` when no usable PDF could be found.
    async fn text_for_doi(&self, doi: &str) -> Result<Option<String>, AdapterError>;
}

/// Locations worth trying for a PDF.
#[derive(Debug, Default, PartialEq)]
pub struct OaUrls {
    pub pdf: Option<String>,
    pub landing: Option<String>,
}

/// Finds a PDF through Unpaywall (falling back to Crossref links), then
/// downloads it and extracts its text.
pub struct OpenAccessTextSource {
    http: Client,
    unpaywall: UnpaywallClient,
    crossref: CrossrefClient,
}

impl OpenAccessTextSource {
    pub fn new(http: Client, unpaywall: UnpaywallClient, crossref: CrossrefClient) -> Self {
        Self {
            http,
            unpaywall,
            crossref,
        }
    }

    pub async fn resolve_oa_urls(&self, doi: &str) -> Result<OaUrls, AdapterError> {
        let location = self.unpaywall.lookup(doi).await?.best_oa_location;
        if let Some(location) = location {
            if location.url_for_pdf.is_some() || location.url.is_some() {
                return Ok(OaUrls {
                    pdf: location.url_for_pdf,
                    landing: location.url,
                });
            }
        }
        let work = self.crossref.work(doi).await?;
        Ok(OaUrls {
            pdf: work.pdf_link(),
            landing: None,
        })
    }

    async fn pdf_link_from_landing(&self, landing_url: &str) -> Option<String> {
        let html = match self.fetch_text(landing_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %landing_url, error = %e, "Landing page fetch failed");
                return None;
            }
        };
        find_pdf_link(&html)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, AdapterError> {
        let response = self.http.get(url).send().await?;
        Ok(ensure_success(response).await?.text().await?)
    }

    async fn download_pdf(&self, url: &str) -> Result<Option<Vec<u8>>, AdapterError> {
        let head = self.http.head(url).send().await?;
        let is_pdf_type = head
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/pdf"));
        if !is_pdf_type && !url.to_ascii_lowercase().ends_with(".pdf") {
            return Ok(None);
        }
        let response = self.http.get(url).send().await?;
        Ok(Some(ensure_success(response).await?.bytes().await?.to_vec()))
    }
}

/// First anchor on the page whose href ends in `.pdf`.
pub fn find_pdf_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").ok()?;
    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.to_ascii_lowercase().ends_with(".pdf"))
        .map(str::to_string)
}

/// Candidate URLs in trial order: a PDF linked from the landing page, the
/// advertised PDF, then the landing page itself. Duplicates removed.
pub fn candidate_urls(urls: &OaUrls, landing_pdf: Option<String>) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for url in [landing_pdf, urls.pdf.clone(), urls.landing.clone()]
        .into_iter()
        .flatten()
    {
        if !url.is_empty() && !candidates.contains(&url) {
            candidates.push(url);
        }
    }
    candidates
}

pub async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, AdapterError> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| AdapterError::Pdf(e.to_string()))?
        .map_err(|e| AdapterError::Pdf(e.to_string()))
}

#[async_trait]
impl TextSource for OpenAccessTextSource {
    async fn text_for_doi(&self, doi: &str) -> Result<Option<String>, AdapterError> {
        let urls = self.resolve_oa_urls(doi).await?;
        let landing_pdf = match urls.landing.as_deref() {
            Some(landing) => self.pdf_link_from_landing(landing).await,
            None => None,
        };

        for url in candidate_urls(&urls, landing_pdf) {
            let bytes = match self.download_pdf(&url).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(doi = %doi, url = %url, error = %e, "PDF candidate failed");
                    continue;
                }
            };
            match extract_pdf_text(bytes).await {
                Ok(text) => return Ok(Some(text)),
                Err(e) => tracing::warn!(doi = %doi, url = %url, error = %e, "PDF candidate failed"),
            }
        }
        Ok(None)
    }
}

/// Pulls full text for verified open-access records.
pub struct ExtractStage {
    source: Arc<dyn TextSource>,
    record_concurrency: usize,
}

impl ExtractStage {
    pub fn new(source: Arc<dyn TextSource>, record_concurrency: usize) -> Self {
        Self {
            source,
            record_concurrency,
        }
    }

    async fn extract_record(&self, job_id: &str, record: &Record) -> Option<String> {
        let doi = match (&record.doi, record.verified, record.open_access) {
            (Some(doi), true, true) => doi,
            _ => return None,
        };
        match self.source.text_for_doi(doi).await {
            Ok(text) => {
                tracing::info!(job_id = %job_id, doi = %doi, found = text.is_some(), "Text extraction finished");
                text
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, doi = %doi, error = %e, "Text extraction failed");
                None
            }
        }
    }
}

#[async_trait]
impl StageProcessor for ExtractStage {
    fn kind(&self) -> StageKind {
        StageKind::Extract
    }

    async fn process(&self, job: &mut JobDocument) -> Result<StageOutcome, StageError> {
        let job_id = job.job_id.as_str();
        let texts = gather_ordered(&job.results, self.record_concurrency, |_, record| {
            self.extract_record(job_id, record)
        })
        .await;

        for (record, text) in job.results.iter_mut().zip(texts) {
            record.extracted_text = text;
        }
        Ok(StageOutcome::Forward)
    }

    fn merge(&self, latest: &mut Record, processed: &Record) {
        latest.extracted_text = processed.extracted_text.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_pdf_link() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://cdn.example.org/paper.PDF">Download</a>
            <a href="/other.pdf">Other</a>
        </body></html>"#;
        assert_eq!(
            find_pdf_link(html).as_deref(),
            Some("https://cdn.example.org/paper.PDF")
        );
        assert_eq!(find_pdf_link("<p>no links</p>"), None);
    }

    #[test]
    fn test_candidate_order_and_dedup() {
        let urls = OaUrls {
            pdf: Some("https://x/a.pdf".into()),
            landing: Some("https://x/a".into()),
        };
        assert_eq!(
            candidate_urls(&urls, Some("https://x/a.pdf".into())),
            vec!["https://x/a.pdf", "https://x/a"]
        );
        assert_eq!(
            candidate_urls(&urls, Some("https://x/b.pdf".into())),
            vec!["https://x/b.pdf", "https://x/a.pdf", "https://x/a"]
        );
        assert!(candidate_urls(&OaUrls::default(), None).is_empty());
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_not_a_pdf() {
        assert!(matches!(
            extract_pdf_text(b"definitely not a pdf".to_vec()).await,
            Err(AdapterError::Pdf(_))
        ));
    }
}
