//! # Metadata Module
//!
//! Descriptor model and per-handler metadata cache.
//!
//! ## Overview
//!
//! The metadata module is responsible for:
//! - The declarative descriptor types associating routes, consumers,
//!   attributes, and producers with a handler ([`RouteDescriptor`],
//!   [`ConsumerDescriptor`], [`AttributeDescriptor`], [`ProducerDescriptor`])
//! - The typed registration front-end handlers use to declare themselves
//!   ([`HandlerDescription`], [`Operation`], [`Describe`])
//! - The [`MetadataStore`]: a lazily-populated, process-lifetime cache of
//!   validated handler metadata, persisted as a single blob through the cache
//!   collaborator
//!
//! ## Ordering
//!
//! Descriptors are ordered by descending priority; ties keep declaration
//! order, with handler-level declarations sorting ahead of operation-level
//! ones at equal priority. The tie-break is an explicit insertion sequence
//! number, not an artifact of the sort implementation.
//!
//! ## Failure behavior
//!
//! Any failure while loading one handler's metadata discards the entire
//! in-memory cache, not just the failing entry. The store never serves state
//! that was sharing structures with a failed load; callers pay a full reload
//! after any failure.

mod descriptors;
mod store;
#[cfg(test)]
mod tests;

pub use descriptors::{
    AttributeDescriptor, ConsumerDescriptor, Describe, Handler, HandlerDescription, InvokeError,
    Invoker, Operation, ProducerDescriptor, RouteDescriptor,
};
pub use store::{
    DescriptorSource, ExecuteError, HandlerMetadata, HandlerResolver, MetadataError,
    MetadataStore, METADATA_CACHE_KEY,
};
