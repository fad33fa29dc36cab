//! # Plugin Module
//!
//! Contracts for the three plugin kinds the dispatch layer drives, plus the
//! built-in JSON and plain-text implementations.
//!
//! - A [`Consumer`] parses the request body once its declared media range
//!   matched the incoming `Content-Type`.
//! - A [`Producer`] assembles the response body once its declared media type
//!   matched the `Accept` header; it may also contribute response headers.
//! - An [`Attribute`] transforms the request before the handler runs
//!   (a domain term — nothing to do with Rust's `#[...]` attributes).
//!
//! Plugins are resolved by name through a [`crate::registry::Registry`];
//! descriptor options are passed to the factory at resolution time.

mod json;
mod text;

pub use json::{JsonConsumer, JsonProducer};
pub use text::TextProducer;

use crate::error::HttpError;
use crate::registry::Registry;
use crate::request::Request;
use serde_json::Value;
use std::sync::Arc;

/// Request-body parser selected by `Content-Type` negotiation.
pub trait Consumer: Send + Sync {
    /// Parse the raw body into the request's parsed-body value.
    ///
    /// `media_type` is the concrete `type/subtype` from the `Content-Type`
    /// header and `parameters` its parsed parameters. `pre_parsed` carries
    /// any value an earlier layer already attached.
    ///
    /// # Errors
    ///
    /// An [`HttpError`] (typically 400) when the body does not conform; it is
    /// rendered as a response, not propagated.
    fn parse(
        &self,
        body: &[u8],
        pre_parsed: Option<&Value>,
        media_type: &str,
        parameters: &[(String, String)],
    ) -> Result<Value, HttpError>;
}

/// Response-body assembler selected by `Accept` negotiation.
pub trait Producer: Send + Sync {
    /// Assemble the response body for `data`; `None` leaves the body empty.
    ///
    /// # Errors
    ///
    /// Assembly failures are server-side bugs and propagate to the hosting
    /// runtime.
    fn assemble(&self, data: &Value) -> anyhow::Result<Option<Vec<u8>>>;

    /// Extra response headers derived from `data`; merged after assembly.
    fn assemble_headers(&self, _data: &Value) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Pre-handler request transformation step.
pub trait Attribute: Send + Sync {
    /// Transform the request, returning the (possibly new) request to thread
    /// forward.
    ///
    /// # Errors
    ///
    /// An [`HttpError`] (typically 422 with a structured payload) when the
    /// request is rejected; it is rendered as a response.
    fn apply(&self, request: Request) -> Result<Request, HttpError>;
}

/// Consumer registry preloaded with the built-in plugins.
#[must_use]
pub fn default_consumers() -> Registry<dyn Consumer> {
    let mut registry: Registry<dyn Consumer> = Registry::new("consumer");
    registry.register_instance("json", Arc::new(JsonConsumer));
    registry
}

/// Producer registry preloaded with the built-in plugins.
#[must_use]
pub fn default_producers() -> Registry<dyn Producer> {
    let mut registry: Registry<dyn Producer> = Registry::new("producer");
    registry.register_instance("json", Arc::new(JsonProducer));
    registry.register_instance("text", Arc::new(TextProducer));
    registry
}
