use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};

use crate::response::PollResponse;

/// One logical fetch, snapshotted from the poller configuration.
#[derive(Clone, Debug)]
pub struct PollRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    /// Per-attempt timeout budget, enforced by the transport.
    pub timeout: Duration,
}

/// Error from the transport capability itself, before any HTTP status
/// exists to classify.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The attempt did not complete within the request's timeout budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Request(reqwest::Error),
    /// Failure reported by a non-HTTP transport implementation.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts are the one transport failure the retry wrapper converts
    /// into a synthetic not-ok response instead of propagating.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Injected "perform a fetch" capability.
///
/// The poller core never talks HTTP directly; it hands a [`PollRequest`] to
/// whatever implements this trait. [`HttpTransport`] is the default; tests
/// inject scripted fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &PollRequest) -> Result<PollResponse, TransportError>;
}

/// Default transport over a shared `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Wraps an existing client, e.g. one with a proxy or custom TLS setup.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::Request(err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &PollRequest) -> Result<PollResponse, TransportError> {
        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|err| Self::map_error(err, request.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        // Reading the body counts against the same timeout budget.
        let body = response
            .bytes()
            .await
            .map_err(|err| Self::map_error(err, request.timeout))?;

        Ok(PollResponse::new(status, headers, body.to_vec()))
    }
}
