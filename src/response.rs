use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::PollError;

/// Snapshot of one HTTP response: status, headers and the raw body bytes.
///
/// The transport capability produces these; classification and body decoding
/// happen here so test transports never need a real HTTP stack.
#[derive(Clone, Debug)]
pub struct PollResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Decoded response body handed to `parse_data`.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Body decoded as JSON because the content-type contained "json".
    Json(serde_json::Value),
    /// Body decoded as text for every other content-type.
    Text(String),
}

impl PollResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Stand-in response for a timed-out transport attempt.
    ///
    /// The retry wrapper substitutes this for a timeout so the retry loop
    /// can treat timeouts like any other not-ok status. 504 is the closest
    /// HTTP reading of "the upstream did not answer in time".
    pub fn synthetic_timeout() -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Classification rule: a response is ok iff its status is 2xx.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// The `Content-Type` header value, when present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Whether the body should be decoded as JSON.
    ///
    /// Substring match, case-insensitive, so parameters like
    /// `application/json; charset=utf-8` and vendor types like
    /// `application/vnd.api+json` still qualify.
    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|value| value.to_ascii_lowercase().contains("json"))
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Decodes the body by content-type: JSON when [`is_json`] holds,
    /// otherwise text (lossy UTF-8, matching what `text()` decoders do).
    ///
    /// [`is_json`]: PollResponse::is_json
    pub fn decode_body(&self) -> Result<Body, PollError> {
        if self.is_json() {
            serde_json::from_slice(&self.body)
                .map(Body::Json)
                .map_err(|err| PollError::Decode(format!("invalid JSON body: {err}")))
        } else {
            Ok(Body::Text(String::from_utf8_lossy(&self.body).into_owned()))
        }
    }
}

impl Body {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(value) => Some(value),
            Body::Json(_) => None,
        }
    }
}
