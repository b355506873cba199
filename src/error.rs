use std::fmt;

use reqwest::{Method, StatusCode, Url};

use crate::response::{Body, PollResponse};
use crate::transport::TransportError;

/// Boxed error produced by a user-supplied `parse_data` function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for poller operations.
///
/// Fetch cycles never return these outward; they are delivered through the
/// `Error` event and the held [`last_error`](crate::Poller::last_error).
/// Only construction and [`start`](crate::Poller::start) fail fast.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Invalid poller configuration, e.g. a missing or unparseable URL.
    #[error("invalid poller configuration: {0}")]
    Config(String),
    /// `start` was called while the poller was already scheduled.
    #[error("could not start polling because the poller is already running")]
    AlreadyRunning,
    /// The transport capability failed before producing a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The response carried a non-2xx status.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The response body could not be decoded for its content-type.
    #[error("failed to decode response body: {0}")]
    Decode(String),
    /// The user-supplied `parse_data` function failed.
    #[error("data parser failed: {0}")]
    Parse(#[source] BoxError),
}

/// A non-2xx HTTP outcome, carrying enough context to diagnose it.
///
/// The response body is held but not decoded up front; call
/// [`response_body`](HttpError::response_body) when the payload matters.
#[derive(Debug)]
pub struct HttpError {
    url: Url,
    method: Method,
    response: PollResponse,
}

impl HttpError {
    pub fn new(url: Url, method: Method, response: PollResponse) -> Self {
        Self {
            url,
            method,
            response,
        }
    }

    /// The parsed target URL of the failing request.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn response(&self) -> &PollResponse {
        &self.response
    }

    /// Decodes the held response body, JSON or text by content-type.
    ///
    /// Lazy on purpose: most error consumers only look at the status, and
    /// error payloads are not always well-formed.
    pub fn response_body(&self) -> Result<Body, PollError> {
        self.response.decode_body()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.response.status();
        write!(f, "HTTP error {}", status.as_u16())?;
        if let Some(reason) = status.canonical_reason() {
            write!(f, " {reason}")?;
        }
        write!(f, " for {} {}", self.method, self.url)
    }
}

impl std::error::Error for HttpError {}
