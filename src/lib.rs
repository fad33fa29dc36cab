//! # waymark
//!
//! **waymark** is a metadata-driven request-dispatch layer for HTTP services:
//! it sits between a host server and per-route handler objects, negotiating
//! request/response media types, running declared request-mutation steps, and
//! invoking the right handler operation for each request.
//!
//! ## Overview
//!
//! Handlers declare their routes, body consumers, response producers, and
//! pre-handler attributes once, through a typed description. waymark turns
//! those declarations into a routing table and a per-handler metadata cache,
//! and drives the whole per-request sequence: producer selection via `Accept`
//! negotiation, consumer selection via `Content-Type` negotiation, attribute
//! application in priority order, handler invocation, and response assembly
//! (including mapping HTTP-code errors to responses).
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`media`]** - `Accept`/`Content-Type` grammar parsing and media range
//!   matching
//! - **[`metadata`]** - descriptor model and the lazily-populated, persisted
//!   per-handler metadata store
//! - **[`router`]** - route registration, path matching, and reverse URI
//!   generation with cached compiled dispatch data
//! - **[`dispatch`]** - the per-request orchestration middleware
//! - **[`registry`]** - typed factory registries for handlers and plugins
//! - **[`plugin`]** - consumer/producer/attribute contracts and built-in
//!   JSON/text implementations
//! - **[`cache`]** - the persistent blob-store collaborator with memory and
//!   file-backed defaults
//! - **[`config`]** - environment-driven cache configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use waymark::cache::MemoryCacheStore;
//! use waymark::dispatch::DispatchMiddleware;
//! use waymark::metadata::{
//!     Describe, DescriptorSource, HandlerDescription, HandlerResolver, MetadataStore,
//!     Operation, ProducerDescriptor, RouteDescriptor,
//! };
//! use waymark::plugin::{default_consumers, default_producers, Attribute};
//! use waymark::registry::{HandlerRegistry, Registry};
//! use waymark::request::Request;
//! use waymark::router::RouteTable;
//!
//! struct Items;
//!
//! impl Describe for Items {
//!     fn describe() -> HandlerDescription {
//!         HandlerDescription::new()
//!             .route(RouteDescriptor::new("/items/{id}"))
//!             .produces(ProducerDescriptor::new("application/json", "json"))
//!             .operation(Operation::get("read", |_: &Items, req: &mut Request| {
//!                 Ok(json!({ "id": req.attribute("id").cloned() }))
//!             }))
//!     }
//! }
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_instance("items", Arc::new(Items));
//! let handlers = Arc::new(handlers);
//!
//! let cache = Arc::new(MemoryCacheStore::new());
//! let store = Arc::new(MetadataStore::new(
//!     Arc::clone(&handlers) as Arc<dyn HandlerResolver>,
//!     Arc::clone(&handlers) as Arc<dyn DescriptorSource>,
//!     cache.clone(),
//! ));
//!
//! let table = RouteTable::new(cache);
//! table.mount("items", &store).unwrap();
//!
//! let middleware = DispatchMiddleware::new(
//!     Arc::clone(&store),
//!     handlers,
//!     Arc::new(default_consumers()),
//!     Arc::new(default_producers()),
//!     Arc::new(Registry::<dyn Attribute>::new("attribute")),
//! );
//!
//! let mut request = Request::new(http::Method::GET, "/items/42")
//!     .with_header("Accept", "application/json");
//! table.route_request(&mut request).unwrap();
//! let response = middleware.handle(request).unwrap();
//! assert_eq!(response.status, 200);
//! store.flush();
//! ```
//!
//! ## Persistence
//!
//! Both the metadata store and the route table derive expensive state lazily
//! and persist it as one blob each through the [`cache::CacheStore`]
//! collaborator. The metadata blob is written once per process lifetime, by
//! an explicit [`metadata::MetadataStore::flush`] call at shutdown; the
//! compiled routing blob is rewritten whenever the registered route set
//! outgrows it.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod metadata;
pub mod plugin;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;

/// Request attribute under which the routing layer records the resolved
/// handler name.
pub const HANDLER_ATTRIBUTE: &str = "waymark.handler";

pub use dispatch::{DispatchError, DispatchMiddleware};
pub use error::HttpError;
pub use media::{InvalidHeaderFormat, MediaRange, MediaRangeList};
pub use metadata::{MetadataError, MetadataStore};
pub use request::Request;
pub use response::Response;
pub use router::{MatchOutcome, RouteTable, RouteTableError};
