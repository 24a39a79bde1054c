use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::FetchConfig;
use crate::util::{validate_url, HostPolicy, UrlValidationError};

/// Media types a feed endpoint may answer with, most specific first
const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, \
     application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

/// Errors that can occur while retrieving a feed payload.
///
/// [`FetchError::Timeout`] is kept apart from every other variant so callers
/// can tell a slow server from a refused or failed request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded the configured time budget
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: {status} {status_text}")]
    HttpStatus { status: u16, status_text: String },
    /// Network-level error (DNS, connection, TLS, body stream)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Feed URL refused before any request was made
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The HTTP client could not be built from configuration
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Single-shot HTTP retrieval of feed payloads.
///
/// One GET per call, no retries: a feed that fails is picked up again by the
/// next scheduled batch. Cheap to clone (the underlying client is shared).
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
    host_policy: HostPolicy,
}

impl Fetcher {
    /// Build a fetcher with the configured User-Agent, Accept header and limits
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            max_body_bytes: config.max_body_bytes,
            host_policy: HostPolicy::from_allow_private(config.allow_private_hosts),
        })
    }

    /// Fetch a feed and return its body as text.
    ///
    /// The whole exchange (connect, headers and body) shares one time
    /// budget. The body is decoded as UTF-8 with invalid sequences replaced.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - Scheme or host refused
    /// - [`FetchError::Timeout`] - Budget exceeded
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::Network`] - Connection, TLS or stream errors
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = validate_url(url, self.host_policy)?;
        let started = Instant::now();
        tracing::debug!(url = %url, "Fetch started");

        let outcome = tokio::time::timeout(self.timeout, self.fetch_inner(parsed)).await;

        // Telemetry only; the result is returned unchanged
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(Ok(body)) => {
                tracing::info!(url = %url, elapsed_ms = elapsed_ms, bytes = body.len(), "Fetch completed")
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %url, elapsed_ms = elapsed_ms, error = %e, "Fetch failed")
            }
            Err(_) => {
                tracing::warn!(url = %url, elapsed_ms = elapsed_ms, timeout = ?self.timeout, "Fetch timed out")
            }
        }

        outcome.map_err(|_| FetchError::Timeout(self.timeout))?
    }

    async fn fetch_inner(&self, url: url::Url) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let bytes = read_limited_bytes(response, self.max_body_bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
