use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::resolver::{BibliographicIndex, Candidate};
use super::{ensure_success, AdapterError};

/// Client for the Crossref works API.
pub struct CrossrefClient {
    http: Client,
    base_url: String,
    mailto: String,
}

#[derive(Deserialize)]
struct ListResponse {
    message: ListMessage,
}

#[derive(Deserialize)]
struct ListMessage {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Deserialize)]
struct WorkResponse {
    message: Work,
}

#[derive(Debug, Default, Deserialize)]
pub struct Work {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub author: Vec<WorkAuthor>,
    #[serde(rename = "is-referenced-by-count")]
    pub referenced_by_count: Option<u64>,
    #[serde(default)]
    pub link: Vec<WorkLink>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkLink {
    #[serde(rename = "URL")]
    pub url: Option<String>,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
}

impl WorkAuthor {
    /// "given family", with missing parts left empty.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.given.as_deref().unwrap_or_default(),
            self.family.as_deref().unwrap_or_default()
        )
    }
}

impl Work {
    /// Candidates need an identifier to be useful; works without a DOI are
    /// dropped, keeping the relative order of the rest.
    fn into_candidate(self) -> Option<Candidate> {
        let identifier = self.doi?;
        Some(Candidate {
            identifier,
            title: self.title.into_iter().next().unwrap_or_default(),
            authors: self.author.iter().map(WorkAuthor::display_name).collect(),
        })
    }

    /// Distinct link URLs in listed order.
    pub fn link_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self.link.iter().filter_map(|l| l.url.clone()) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// First link advertised as a PDF.
    pub fn pdf_link(&self) -> Option<String> {
        self.link
            .iter()
            .find(|l| {
                l.content_type
                    .as_deref()
                    .is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
            })
            .and_then(|l| l.url.clone())
    }
}

impl CrossrefClient {
    pub fn new(http: Client, base_url: &str, mailto: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto: mailto.to_string(),
        }
    }

    /// Full metadata for one DOI.
    pub async fn work(&self, doi: &str) -> Result<Work, AdapterError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, doi))
            .query(&[("mailto", self.mailto.as_str())])
            .send()
            .await?;
        let body: WorkResponse = ensure_success(response).await?.json().await?;
        Ok(body.message)
    }
}

#[async_trait]
impl BibliographicIndex for CrossrefClient {
    async fn search(
        &self,
        title: &str,
        author: &str,
        rows: usize,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let rows = rows.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("query.bibliographic", title),
                ("query.author", author),
                ("rows", rows.as_str()),
                ("mailto", self.mailto.as_str()),
            ])
            .send()
            .await?;
        let body: ListResponse = ensure_success(response).await?.json().await?;
        Ok(body
            .message
            .items
            .into_iter()
            .filter_map(Work::into_candidate)
            .collect())
    }

    async fn citation_count(&self, identifier: &str) -> Result<Option<u64>, AdapterError> {
        Ok(self.work(identifier).await?.referenced_by_count)
    }
}
