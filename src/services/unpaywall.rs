use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, AdapterError};

/// Open-access status lookup by DOI.
#[async_trait]
pub trait OpenAccessLookup: Send + Sync + 'static {
    async fn is_open_access(&self, doi: &str) -> Result<bool, AdapterError>;
}

/// Client for the Unpaywall API.
pub struct UnpaywallClient {
    http: Client,
    base_url: String,
    email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnpaywallRecord {
    #[serde(default)]
    pub is_oa: bool,
    pub best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaLocation {
    pub url: Option<String>,
    pub url_for_pdf: Option<String>,
}

impl UnpaywallClient {
    pub fn new(http: Client, base_url: &str, email: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
        }
    }

    pub async fn lookup(&self, doi: &str) -> Result<UnpaywallRecord, AdapterError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, doi))
            .query(&[("email", self.email.as_str())])
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

#[async_trait]
impl OpenAccessLookup for UnpaywallClient {
    async fn is_open_access(&self, doi: &str) -> Result<bool, AdapterError> {
        Ok(self.lookup(doi).await?.is_oa)
    }
}
