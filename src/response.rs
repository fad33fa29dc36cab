//! Response message type produced by the dispatch layer.

use crate::error::status_reason;
use crate::request::HeaderVec;
use std::sync::Arc;

/// An HTTP response under assembly.
///
/// The dispatch layer pre-builds a response before running the handler so the
/// negotiated `Content-Type` is already in place when the body is populated.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase; `None` falls back to the canonical phrase for the code.
    pub reason: Option<String>,
    /// Response headers (stack-allocated for the common case).
    pub headers: HeaderVec,
    /// Response body bytes; empty when no producer ran.
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Create an empty 200 response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            reason: None,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    /// Get a header by name (case-insensitive).
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    /// Set the status line.
    pub fn set_status(&mut self, status: u16, reason: Option<String>) {
        self.status = status;
        self.reason = reason;
    }

    /// The reason phrase to write on the status line.
    #[must_use]
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| status_reason(self.status))
    }
}
