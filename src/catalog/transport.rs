//! HTTP transport seam for the catalog client.
//!
//! The client only needs "GET this URL"; keeping that behind a trait lets
//! tests script status codes, delays and failures without a network.

use async_trait::async_trait;
use std::time::Duration;

/// A completed HTTP exchange (any status).
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Parsed `Retry-After` (delta-seconds form only)
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(u64),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connection(_))
    }
}

/// Minimal HTTP client used by the catalog.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, accept: &str) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] over reqwest.
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    max_body_bytes: u64,
}

impl ReqwestTransport {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        max_body_bytes: u64,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            max_body_bytes,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, accept: &str) -> Result<HttpResponse, TransportError> {
        let mut response = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if let Some(len) = response.content_length()
            && len > self.max_body_bytes
        {
            return Err(TransportError::BodyTooLarge(self.max_body_bytes));
        }

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        // Read in chunks so a missing Content-Length can't blow the limit
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_body_bytes {
                return Err(TransportError::BodyTooLarge(self.max_body_bytes));
            }
        }

        Ok(HttpResponse {
            status,
            content_type,
            retry_after,
            body,
        })
    }
}

/// Parse the delta-seconds form of `Retry-After`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
