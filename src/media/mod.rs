//! # Media Range Module
//!
//! Parsing and matching of `Accept`/`Content-Type`-style header values.
//!
//! ## Overview
//!
//! The media module is responsible for:
//! - Parsing a comma-separated list of RFC 7231 media ranges, with optional
//!   `;name=value` parameters (quoted or unquoted), into [`MediaRange`] tuples
//! - Reporting malformed input with the exact offending byte position, or a
//!   named category for end-of-input failures
//! - Checking whether a concrete media type (or a declared wildcard range) is
//!   covered by any parsed range
//!
//! ## Architecture
//!
//! Parsing is a byte-driven finite state machine: every (state, byte) pair
//! deterministically yields a next state and an accumulator action. There is
//! no backtracking and no regex involved, which keeps error positions exact
//! and makes the grammar auditable against the RFC.
//!
//! Matching uses three prefix forms per parsed range, tried from most to
//! least general: the full wildcard, `type/*`, and `type/subtype`. A
//! candidate matches the concrete form when it equals the prefix or continues
//! with a space, tab, or `;` (so `application/json; charset=utf-8` matches
//! the `application/json` form but `application/jsonx` does not).
//!
//! ## Example
//!
//! ```rust
//! use waymark::media::MediaRangeList;
//!
//! let accept = MediaRangeList::parse("text/html, application/*;q=\"0.5\"").unwrap();
//! assert!(accept.matches("application/json"));
//! assert!(accept.matches("text/html; charset=utf-8"));
//! assert!(!accept.matches("image/png"));
//! ```

mod core;
#[cfg(test)]
mod tests;

pub use self::core::{InvalidHeaderFormat, MediaRange, MediaRangeList};
