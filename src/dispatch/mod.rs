//! # Dispatch Module
//!
//! Per-request orchestration: negotiation, attribute application, handler
//! invocation, and response assembly.
//!
//! ## Request flow
//!
//! For each request, [`DispatchMiddleware::handle`] runs a strictly ordered
//! sequence:
//!
//! 1. Read the handler name from the request attribute bag (placed there by
//!    the routing layer).
//! 2. Select a producer by matching the `Accept` header (default `*/*`)
//!    against the handler's producer descriptors; the negotiated media type
//!    becomes the response `Content-Type`. No match is a 406.
//! 3. Select a consumer by matching the single `Content-Type` value against
//!    the handler's consumer descriptors and let it parse the body. No match
//!    is a 415.
//! 4. Apply attributes in priority order, threading the request through each.
//! 5. Resolve the handler instance and execute its operation for the method.
//! 6. Assemble the response body from the result via the selected producer.
//!
//! ## Failure semantics
//!
//! [`crate::error::HttpError`] values raised in steps 3–5 are rendered
//! through the selected producer; failures in step 2 (and anything escaping
//! it) render bare, from the error alone. Plugin-resolution failures and
//! metadata errors are configuration bugs: they return as
//! [`DispatchError`] and are never softened into responses.

mod core;

pub use self::core::{DispatchError, DispatchMiddleware};
