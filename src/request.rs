//! Request message type used at the middleware boundary.
//!
//! The hosting server adapts its own request representation into [`Request`]
//! before calling the dispatch layer. Headers use stack-allocated storage for
//! the common case, following the same pattern as the response type.

use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum inline headers before heap allocation.
/// Most requests carry well under 16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage.
///
/// Header names use `Arc<str>` because they repeat across requests
/// (Content-Type, Accept, ...) and `Arc::clone()` is an O(1) atomic increment;
/// values are per-request data and stay `String`.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// An HTTP request as seen by the dispatch layer.
///
/// Carries the raw body bytes alongside an optional parsed body (populated by
/// the matching consumer) and an attribute bag used to thread routing results
/// and cross-cutting state between attributes and the handler.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method (GET, POST, ...).
    pub method: Method,
    /// Request path, percent-decoded by the hosting server.
    pub path: String,
    /// HTTP headers; duplicate names are kept as separate entries.
    pub headers: HeaderVec,
    /// Raw request body.
    pub body: Vec<u8>,
    /// Body after consumer parsing, if a consumer ran.
    pub parsed_body: Option<Value>,
    /// Request attribute bag (routing results, attribute-produced state).
    pub attributes: HashMap<String, Value>,
}

impl Request {
    /// Create an empty request for the given method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderVec::new(),
            body: Vec::new(),
            parsed_body: None,
            attributes: HashMap::new(),
        }
    }

    /// Get the first header value by name (case-insensitive per RFC 7230).
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Collect every value carried for a header name, in declaration order.
    ///
    /// Negotiation needs the full list: a request with two `Content-Type`
    /// headers is rejected, and multiple `Accept` values are joined.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Append a header; existing entries with the same name are kept.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((Arc::from(name), value.into()));
    }

    /// Builder-style header append.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Builder-style body assignment.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a request attribute by name.
    #[inline]
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set a request attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Builder-style attribute assignment.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_attribute(name, value);
        self
    }
}
