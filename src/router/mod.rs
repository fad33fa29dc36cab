//! # Router Module
//!
//! Path matching and reverse URI generation for the dispatch layer.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Registering routes (directly, or by mounting a handler's declared
//!   metadata)
//! - Matching an incoming method and path to a route, extracting captured
//!   path variables merged over the route's defaults
//! - Generating URIs from route names with longest-match expansion of
//!   optional segments
//!
//! ## Architecture
//!
//! The table uses a two-phase approach:
//!
//! 1. **Compilation**: registered patterns (e.g. `/items/{id:[0-9]+}[/full]`)
//!    are parsed into per-optional-level segment variants and compiled into
//!    anchored regexes, ordered by route priority. The compiled artifact is
//!    persisted through the cache collaborator and restored on startup.
//!
//! 2. **Matching**: each incoming path is tested against the compiled
//!    matchers in order until one matches; the route's allowed methods then
//!    decide between a match and a method-not-allowed outcome.
//!
//! The compiled artifact stays valid while it covers every registered route;
//! registering a route it does not know invalidates it, and the next match or
//! generate operation rebuilds and re-persists it.

mod core;
mod parse;

pub use self::core::{
    MatchOutcome, Route, RouteMatch, RouteTable, RouteTableError, ROUTES_CACHE_KEY,
};
pub use parse::{PatternError, Segment};
