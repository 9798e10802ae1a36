//! Stage processors and the thin HTTP adapters they call.

use std::time::Duration;

use reqwest::{Client, Response};

pub mod classify;
pub mod crossref;
pub mod extract;
pub mod harvest;
pub mod originality;
pub mod resolve;
pub mod resolver;
pub mod similarity;
pub mod unpaywall;

const USER_AGENT: &str = concat!("scholar-pipeline/", env!("CARGO_PKG_VERSION"));

/// Shared builder for outbound clients; every call carries `timeout`.
pub fn http_client(timeout: Duration) -> Result<Client, AdapterError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(AdapterError::Http)
}

/// Turn a non-2xx response into [`AdapterError::Status`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected upstream response: {0}")]
    Response(String),

    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),

    #[error("Adapter not configured: {0}")]
    NotConfigured(&'static str),
}
