//! HTTP-code error contract shared by consumers, attributes, and handlers.
//!
//! An [`HttpError`] is the one error shape the dispatch layer converts into a
//! response instead of propagating: it carries the numeric status, an optional
//! reason phrase, an opaque JSON payload, and extra response headers.
//! Everything else (registry misconfiguration, metadata validation failures)
//! stays a hard error and is returned to the hosting runtime untouched.

use serde_json::Value;
use std::fmt;

/// Resolve the canonical reason phrase for a status code.
pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        409 => "Conflict",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Error that is rendered as an HTTP response.
///
/// Raised by consumers (malformed bodies), attributes (validation failures),
/// handlers (domain-level 4xx), and by the dispatch layer itself (negotiation
/// failures). The payload is handed to the selected producer when one is
/// available; the headers are merged into the response.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// HTTP status code (4xx for client input problems).
    pub status: u16,
    /// Reason phrase; `None` falls back to the canonical phrase for the code.
    pub reason: Option<String>,
    /// Opaque payload rendered as the response body.
    pub payload: Value,
    /// Extra headers merged into the response.
    pub headers: Vec<(String, String)>,
}

impl HttpError {
    /// Create an error with the given status and no payload.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            payload: Value::Null,
            headers: Vec::new(),
        }
    }

    /// Override the reason phrase.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a payload for the producer to render.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 400 with a specific reason phrase.
    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400).with_reason(reason)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404)
    }

    /// 405 with the allowed methods advertised via the `Allow` header.
    #[must_use]
    pub fn method_not_allowed(allowed: &[http::Method]) -> Self {
        let allow = allowed
            .iter()
            .map(http::Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(405).with_header("Allow", allow)
    }

    /// 406 Not Acceptable (no producer matched the Accept header).
    #[must_use]
    pub fn not_acceptable() -> Self {
        Self::new(406)
    }

    /// 415 Unsupported Media Type (no consumer matched the Content-Type).
    #[must_use]
    pub fn unsupported_media_type() -> Self {
        Self::new(415)
    }

    /// 422 with a structured error payload.
    #[must_use]
    pub fn unprocessable(payload: Value) -> Self {
        Self::new(422).with_payload(payload)
    }

    /// The reason phrase to write on the status line.
    #[must_use]
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| status_reason(self.status))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}", self.status, self.reason_phrase())
    }
}

impl std::error::Error for HttpError {}
