use super::descriptors::{
    AttributeDescriptor, ConsumerDescriptor, DescriptorQueue, Handler, HandlerDescription,
    InvokeError, Invoker, ProducerDescriptor, RouteDescriptor,
};
use crate::cache::CacheStore;
use crate::error::HttpError;
use crate::media::{InvalidHeaderFormat, MediaRangeList};
use crate::request::Request;
use http::Method;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Fixed key under which the store persists its blob.
pub const METADATA_CACHE_KEY: &str = "waymark.metadata";

/// Resolves a handler name to a live instance.
pub trait HandlerResolver: Send + Sync {
    /// Return the handler instance registered under `name`.
    fn resolve(&self, name: &str) -> anyhow::Result<Arc<dyn Handler>>;
}

/// Reads a handler's declared description.
///
/// The single descriptor-reading seam: how a handler states its metadata
/// (builder calls, macros, generated code) is a front-end concern; the store
/// only sees the resulting [`HandlerDescription`].
pub trait DescriptorSource: Send + Sync {
    /// Return the description declared for `name`.
    fn describe(&self, name: &str) -> anyhow::Result<HandlerDescription>;
}

/// Errors raised while loading, validating, or executing handler metadata.
///
/// All of these are configuration problems, not client input: they are never
/// converted into 4xx responses.
#[derive(Debug)]
pub enum MetadataError {
    /// The handler resolver failed for this name.
    HandlerResolution {
        /// Handler name.
        handler: String,
        /// Resolver failure.
        source: anyhow::Error,
    },
    /// The descriptor source failed for this name.
    Description {
        /// Handler name.
        handler: String,
        /// Source failure.
        source: anyhow::Error,
    },
    /// The handler declared no routes.
    NoRouteDeclared {
        /// Handler name.
        handler: String,
    },
    /// Two routes of one handler share a name after defaulting.
    DuplicateRouteName {
        /// Handler name.
        handler: String,
        /// The colliding route name.
        name: String,
    },
    /// A consumer declared a media range that does not parse.
    InvalidMediaRange {
        /// Handler name.
        handler: String,
        /// The offending range string.
        media_range: String,
        /// Parse failure detail.
        source: InvalidHeaderFormat,
    },
    /// Two operations of one handler claim the same HTTP method.
    DuplicateHttpMethodHandler {
        /// Handler name.
        handler: String,
        /// The HTTP method claimed twice.
        method: Method,
        /// Operation that claimed it first.
        first: String,
        /// Operation that claimed it again.
        second: String,
    },
    /// The handler declared no HTTP-method-bearing operations.
    NoHttpMethodsDeclared {
        /// Handler name.
        handler: String,
    },
    /// The instance handed to `execute` is not the type recorded at load.
    InvalidHandlerObject {
        /// Handler name.
        handler: String,
        /// Type recorded at load.
        expected: String,
        /// Type actually supplied.
        actual: String,
    },
    /// No operation is bound for the requested HTTP method.
    NoSuchOperation {
        /// Handler name.
        handler: String,
        /// The unbound method.
        method: Method,
    },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::HandlerResolution { handler, source } => {
                write!(f, "failed to resolve handler '{handler}': {source:#}")
            }
            MetadataError::Description { handler, source } => {
                write!(f, "failed to describe handler '{handler}': {source:#}")
            }
            MetadataError::NoRouteDeclared { handler } => {
                write!(f, "handler '{handler}' declares no routes")
            }
            MetadataError::DuplicateRouteName { handler, name } => {
                write!(f, "handler '{handler}' declares route name '{name}' twice")
            }
            MetadataError::InvalidMediaRange {
                handler,
                media_range,
                source,
            } => {
                write!(
                    f,
                    "handler '{handler}' declares invalid media range '{media_range}': {source}"
                )
            }
            MetadataError::DuplicateHttpMethodHandler {
                handler,
                method,
                first,
                second,
            } => {
                write!(
                    f,
                    "handler '{handler}' claims {method} in both '{first}' and '{second}'"
                )
            }
            MetadataError::NoHttpMethodsDeclared { handler } => {
                write!(f, "handler '{handler}' declares no HTTP methods")
            }
            MetadataError::InvalidHandlerObject {
                handler,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "handler '{handler}' instance has type {actual}, expected {expected}"
                )
            }
            MetadataError::NoSuchOperation { handler, method } => {
                write!(f, "handler '{handler}' has no operation for {method}")
            }
        }
    }
}

impl std::error::Error for MetadataError {}

/// Error returned by [`MetadataStore::execute`].
#[derive(Debug)]
pub enum ExecuteError {
    /// The operation raised an HTTP-code error; the dispatch layer renders it.
    Http(HttpError),
    /// Metadata-level failure; propagates to the hosting runtime.
    Metadata(MetadataError),
}

impl From<HttpError> for ExecuteError {
    fn from(err: HttpError) -> Self {
        ExecuteError::Http(err)
    }
}

impl From<MetadataError> for ExecuteError {
    fn from(err: MetadataError) -> Self {
        ExecuteError::Metadata(err)
    }
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecuteError::Http(err) => write!(f, "{err}"),
            ExecuteError::Metadata(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ExecuteError {}

/// Invoker table and recorded handler type; bound at load, or lazily on the
/// first execution of a blob-restored entry.
struct HandlerBinding {
    type_id: TypeId,
    type_name: &'static str,
    invokers: HashMap<Method, Invoker>,
}

/// Validated metadata for one handler.
#[derive(Default)]
pub struct HandlerMetadata {
    methods: Vec<Method>,
    operation_names: HashMap<Method, String>,
    routes: Vec<RouteDescriptor>,
    consumers: HashMap<Method, Vec<ConsumerDescriptor>>,
    attributes: HashMap<Method, Vec<AttributeDescriptor>>,
    producers: HashMap<Method, Vec<ProducerDescriptor>>,
    binding: OnceCell<HandlerBinding>,
}

impl fmt::Debug for HandlerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMetadata")
            .field("methods", &self.methods)
            .field("operation_names", &self.operation_names)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

const EMPTY_CONSUMERS: &[ConsumerDescriptor] = &[];
const EMPTY_ATTRIBUTES: &[AttributeDescriptor] = &[];
const EMPTY_PRODUCERS: &[ProducerDescriptor] = &[];

impl HandlerMetadata {
    /// HTTP methods in declaration order.
    #[must_use]
    pub fn http_methods(&self) -> &[Method] {
        &self.methods
    }

    /// Routes ordered by descending priority (ties keep declaration order).
    #[must_use]
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// The operation name bound to an HTTP method.
    #[must_use]
    pub fn operation_name(&self, method: &Method) -> Option<&str> {
        self.operation_names.get(method).map(String::as_str)
    }

    /// Ordered consumers for an HTTP method; empty when none are declared.
    #[must_use]
    pub fn consumers_for(&self, method: &Method) -> &[ConsumerDescriptor] {
        self.consumers
            .get(method)
            .map_or(EMPTY_CONSUMERS, Vec::as_slice)
    }

    /// Ordered attributes for an HTTP method; empty when none are declared.
    #[must_use]
    pub fn attributes_for(&self, method: &Method) -> &[AttributeDescriptor] {
        self.attributes
            .get(method)
            .map_or(EMPTY_ATTRIBUTES, Vec::as_slice)
    }

    /// Ordered producers for an HTTP method; empty when none are declared.
    #[must_use]
    pub fn producers_for(&self, method: &Method) -> &[ProducerDescriptor] {
        self.producers
            .get(method)
            .map_or(EMPTY_PRODUCERS, Vec::as_slice)
    }
}

/// Serialized form of the store: descriptors only, HTTP methods as strings.
/// Invokers and type identities are rebuilt live and never persisted.
#[derive(Serialize, Deserialize)]
struct PersistedState {
    handlers: HashMap<String, PersistedHandler>,
}

#[derive(Serialize, Deserialize)]
struct PersistedHandler {
    methods: Vec<String>,
    operation_names: HashMap<String, String>,
    routes: Vec<RouteDescriptor>,
    consumers: HashMap<String, Vec<ConsumerDescriptor>>,
    attributes: HashMap<String, Vec<AttributeDescriptor>>,
    producers: HashMap<String, Vec<ProducerDescriptor>>,
}

fn parse_method(s: &str) -> Option<Method> {
    Method::from_bytes(s.as_bytes()).ok()
}

impl PersistedHandler {
    fn from_runtime(meta: &HandlerMetadata) -> Self {
        fn keyed<T: Clone>(map: &HashMap<Method, Vec<T>>) -> HashMap<String, Vec<T>> {
            map.iter()
                .map(|(method, items)| (method.to_string(), items.clone()))
                .collect()
        }
        Self {
            methods: meta.methods.iter().map(|m| m.to_string()).collect(),
            operation_names: meta
                .operation_names
                .iter()
                .map(|(method, name)| (method.to_string(), name.clone()))
                .collect(),
            routes: meta.routes.clone(),
            consumers: keyed(&meta.consumers),
            attributes: keyed(&meta.attributes),
            producers: keyed(&meta.producers),
        }
    }

    /// Rebuild runtime metadata; `None` marks the blob as unusable (unknown
    /// method string or a media range that no longer parses).
    fn into_runtime(self) -> Option<HandlerMetadata> {
        fn unkeyed<T>(map: HashMap<String, Vec<T>>) -> Option<HashMap<Method, Vec<T>>> {
            map.into_iter()
                .map(|(method, items)| parse_method(&method).map(|m| (m, items)))
                .collect()
        }
        let methods = self
            .methods
            .iter()
            .map(|m| parse_method(m))
            .collect::<Option<Vec<_>>>()?;
        let operation_names = self
            .operation_names
            .into_iter()
            .map(|(method, name)| parse_method(&method).map(|m| (m, name)))
            .collect::<Option<HashMap<_, _>>>()?;
        let mut consumers = unkeyed(self.consumers)?;
        for descriptor in consumers.values_mut().flatten() {
            descriptor.ranges = Some(MediaRangeList::parse(&descriptor.media_range).ok()?);
        }
        Some(HandlerMetadata {
            methods,
            operation_names,
            routes: self.routes,
            consumers,
            attributes: unkeyed(self.attributes)?,
            producers: unkeyed(self.producers)?,
            binding: OnceCell::new(),
        })
    }
}

struct StoreState {
    handlers: HashMap<String, Arc<HandlerMetadata>>,
    dirty: bool,
}

/// Lazily-populated, process-lifetime cache of validated handler metadata.
///
/// Entries are loaded on first access by resolving the handler and reading
/// its declared description, validated, then memoized. A restored blob skips
/// validation entirely; only the invoker table is re-bound on first
/// execution. Any load failure discards the whole in-memory cache.
pub struct MetadataStore {
    resolver: Arc<dyn HandlerResolver>,
    source: Arc<dyn DescriptorSource>,
    cache: Arc<dyn CacheStore>,
    persist: bool,
    state: RwLock<StoreState>,
}

impl MetadataStore {
    /// Create a store backed by the given collaborators, restoring any
    /// previously persisted blob.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn HandlerResolver>,
        source: Arc<dyn DescriptorSource>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self::with_persistence(resolver, source, cache, true)
    }

    /// Create a store honoring the environment-driven cache configuration.
    #[must_use]
    pub fn with_config(
        resolver: Arc<dyn HandlerResolver>,
        source: Arc<dyn DescriptorSource>,
        cache: Arc<dyn CacheStore>,
        config: &crate::config::CacheConfig,
    ) -> Self {
        Self::with_persistence(resolver, source, cache, config.persist_metadata)
    }

    /// Create a store with persistence switched on or off.
    ///
    /// With persistence off, the cache collaborator is never read or written.
    #[must_use]
    pub fn with_persistence(
        resolver: Arc<dyn HandlerResolver>,
        source: Arc<dyn DescriptorSource>,
        cache: Arc<dyn CacheStore>,
        persist: bool,
    ) -> Self {
        let handlers = if persist {
            Self::restore(cache.as_ref())
        } else {
            HashMap::new()
        };
        Self {
            resolver,
            source,
            cache,
            persist,
            state: RwLock::new(StoreState {
                handlers,
                dirty: false,
            }),
        }
    }

    fn restore(cache: &dyn CacheStore) -> HashMap<String, Arc<HandlerMetadata>> {
        let Some(bytes) = cache.get(METADATA_CACHE_KEY) else {
            return HashMap::new();
        };
        let decoded = serde_json::from_slice::<PersistedState>(&bytes)
            .ok()
            .and_then(|state| {
                state
                    .handlers
                    .into_iter()
                    .map(|(name, handler)| handler.into_runtime().map(|m| (name, Arc::new(m))))
                    .collect::<Option<HashMap<_, _>>>()
            });
        match decoded {
            Some(handlers) => {
                info!(handlers = handlers.len(), "restored handler metadata blob");
                handlers
            }
            None => {
                warn!("persisted handler metadata blob is unreadable, starting empty");
                HashMap::new()
            }
        }
    }

    /// The validated metadata for a handler, loading it on first access.
    ///
    /// # Errors
    ///
    /// Any resolution, description, or validation failure. After an error the
    /// whole in-memory cache has been discarded.
    pub fn metadata(&self, name: &str) -> Result<Arc<HandlerMetadata>, MetadataError> {
        {
            let state = self.state.read().expect("metadata lock poisoned");
            if let Some(meta) = state.handlers.get(name) {
                return Ok(Arc::clone(meta));
            }
        }
        let mut state = self.state.write().expect("metadata lock poisoned");
        if let Some(meta) = state.handlers.get(name) {
            return Ok(Arc::clone(meta));
        }
        match self.load(name) {
            Ok(meta) => {
                info!(
                    handler = %name,
                    methods = ?meta.methods,
                    routes = meta.routes.len(),
                    "handler metadata loaded"
                );
                let meta = Arc::new(meta);
                state.handlers.insert(name.to_string(), Arc::clone(&meta));
                state.dirty = true;
                Ok(meta)
            }
            Err(err) => {
                // One bad handler invalidates everything: entries loaded
                // earlier may share queue state with the failed load, so the
                // store refuses to serve any of them until reloaded.
                error!(
                    handler = %name,
                    error = %err,
                    discarded = state.handlers.len(),
                    "handler metadata load failed, discarding all cached metadata"
                );
                state.handlers.clear();
                Err(err)
            }
        }
    }

    /// Load and validate one handler's metadata from its declared
    /// description.
    fn load(&self, name: &str) -> Result<HandlerMetadata, MetadataError> {
        let handler = self
            .resolver
            .resolve(name)
            .map_err(|source| MetadataError::HandlerResolution {
                handler: name.to_string(),
                source,
            })?;
        let description =
            self.source
                .describe(name)
                .map_err(|source| MetadataError::Description {
                    handler: name.to_string(),
                    source,
                })?;

        if description.routes.is_empty() {
            return Err(MetadataError::NoRouteDeclared {
                handler: name.to_string(),
            });
        }
        let mut seen_routes: Vec<&str> = Vec::with_capacity(description.routes.len());
        for route in &description.routes {
            let route_name = route.effective_name();
            if seen_routes.contains(&route_name) {
                return Err(MetadataError::DuplicateRouteName {
                    handler: name.to_string(),
                    name: route_name.to_string(),
                });
            }
            seen_routes.push(route_name);
        }

        let hydrate = |mut descriptor: ConsumerDescriptor| -> Result<ConsumerDescriptor, MetadataError> {
            let ranges = MediaRangeList::parse(&descriptor.media_range).map_err(|source| {
                MetadataError::InvalidMediaRange {
                    handler: name.to_string(),
                    media_range: descriptor.media_range.clone(),
                    source,
                }
            })?;
            descriptor.ranges = Some(ranges);
            Ok(descriptor)
        };

        let mut route_queue = DescriptorQueue::default();
        for route in description.routes {
            route_queue.push(route.priority, route);
        }

        // Handler-level queues seed each operation's queue; cloning keeps the
        // insertion sequence so handler-level entries win priority ties.
        let mut common_consumers = DescriptorQueue::default();
        for descriptor in description.consumers {
            let descriptor = hydrate(descriptor)?;
            common_consumers.push(descriptor.priority, descriptor);
        }
        let mut common_attributes = DescriptorQueue::default();
        for descriptor in description.attributes {
            common_attributes.push(descriptor.priority, descriptor);
        }
        let mut common_producers = DescriptorQueue::default();
        for descriptor in description.producers {
            common_producers.push(descriptor.priority, descriptor);
        }

        let mut meta = HandlerMetadata {
            routes: route_queue.into_sorted(),
            ..HandlerMetadata::default()
        };
        let mut invokers: HashMap<Method, Invoker> = HashMap::new();

        for operation in description.operations {
            let method = operation.http_method.clone();
            if let Some(first) = meta.operation_names.get(&method) {
                return Err(MetadataError::DuplicateHttpMethodHandler {
                    handler: name.to_string(),
                    method,
                    first: first.clone(),
                    second: operation.name,
                });
            }

            let mut consumer_queue = common_consumers.clone();
            for descriptor in operation.consumers {
                let descriptor = hydrate(descriptor)?;
                consumer_queue.push(descriptor.priority, descriptor);
            }
            let mut attribute_queue = common_attributes.clone();
            for descriptor in operation.attributes {
                attribute_queue.push(descriptor.priority, descriptor);
            }
            let mut producer_queue = common_producers.clone();
            for descriptor in operation.producers {
                producer_queue.push(descriptor.priority, descriptor);
            }

            meta.consumers
                .insert(method.clone(), consumer_queue.into_sorted());
            meta.attributes
                .insert(method.clone(), attribute_queue.into_sorted());
            meta.producers
                .insert(method.clone(), producer_queue.into_sorted());
            meta.operation_names
                .insert(method.clone(), operation.name.clone());
            invokers.insert(method.clone(), operation.invoker);
            meta.methods.push(method);
        }

        if meta.methods.is_empty() {
            return Err(MetadataError::NoHttpMethodsDeclared {
                handler: name.to_string(),
            });
        }

        let binding = HandlerBinding {
            type_id: handler.as_any().type_id(),
            type_name: handler.type_name(),
            invokers,
        };
        // Fresh cell on a just-built metadata value; set cannot collide.
        let _ = meta.binding.set(binding);
        Ok(meta)
    }

    /// Bind invokers and the recorded type for a blob-restored entry.
    ///
    /// Validation is deliberately skipped here: the blob was validated when
    /// it was written, and skipping it is what the persistent cache buys.
    fn binding<'a>(
        &self,
        name: &str,
        meta: &'a HandlerMetadata,
    ) -> Result<&'a HandlerBinding, MetadataError> {
        meta.binding.get_or_try_init(|| {
            debug!(handler = %name, "binding invokers for restored metadata");
            let handler =
                self.resolver
                    .resolve(name)
                    .map_err(|source| MetadataError::HandlerResolution {
                        handler: name.to_string(),
                        source,
                    })?;
            let description =
                self.source
                    .describe(name)
                    .map_err(|source| MetadataError::Description {
                        handler: name.to_string(),
                        source,
                    })?;
            let mut invokers: HashMap<Method, Invoker> = HashMap::new();
            for operation in description.operations {
                if meta.operation_names.contains_key(&operation.http_method) {
                    invokers.insert(operation.http_method.clone(), operation.invoker);
                }
            }
            Ok(HandlerBinding {
                type_id: handler.as_any().type_id(),
                type_name: handler.type_name(),
                invokers,
            })
        })
    }

    /// HTTP methods declared by a handler, in declaration order.
    pub fn http_methods(&self, name: &str) -> Result<Vec<Method>, MetadataError> {
        Ok(self.metadata(name)?.methods.clone())
    }

    /// Routes declared by a handler, ordered by priority.
    pub fn routes(&self, name: &str) -> Result<Vec<RouteDescriptor>, MetadataError> {
        Ok(self.metadata(name)?.routes.clone())
    }

    /// Whether a handler declares consumers for an HTTP method.
    pub fn has_consumers(&self, name: &str, method: &Method) -> Result<bool, MetadataError> {
        Ok(!self.metadata(name)?.consumers_for(method).is_empty())
    }

    /// Whether a handler declares producers for an HTTP method.
    pub fn has_producers(&self, name: &str, method: &Method) -> Result<bool, MetadataError> {
        Ok(!self.metadata(name)?.producers_for(method).is_empty())
    }

    /// Ordered consumers for (handler, method).
    pub fn consumers(
        &self,
        name: &str,
        method: &Method,
    ) -> Result<Vec<ConsumerDescriptor>, MetadataError> {
        Ok(self.metadata(name)?.consumers_for(method).to_vec())
    }

    /// Ordered attributes for (handler, method).
    pub fn attributes(
        &self,
        name: &str,
        method: &Method,
    ) -> Result<Vec<AttributeDescriptor>, MetadataError> {
        Ok(self.metadata(name)?.attributes_for(method).to_vec())
    }

    /// Ordered producers for (handler, method).
    pub fn producers(
        &self,
        name: &str,
        method: &Method,
    ) -> Result<Vec<ProducerDescriptor>, MetadataError> {
        Ok(self.metadata(name)?.producers_for(method).to_vec())
    }

    /// Invoke the operation a handler binds to an HTTP method.
    ///
    /// Verifies that `handler` is an instance of the type recorded when the
    /// metadata was loaded before invoking.
    pub fn execute(
        &self,
        name: &str,
        method: &Method,
        handler: &dyn Handler,
        request: &mut Request,
    ) -> Result<Value, ExecuteError> {
        let meta = self.metadata(name)?;
        let binding = match self.binding(name, &meta) {
            Ok(binding) => binding,
            Err(err) => {
                // Binding is part of the lazy load path; its failures reset
                // the cache the same way a load failure does.
                error!(
                    handler = %name,
                    error = %err,
                    "invoker binding failed, discarding all cached metadata"
                );
                self.state
                    .write()
                    .expect("metadata lock poisoned")
                    .handlers
                    .clear();
                return Err(err.into());
            }
        };
        if handler.as_any().type_id() != binding.type_id {
            return Err(MetadataError::InvalidHandlerObject {
                handler: name.to_string(),
                expected: binding.type_name.to_string(),
                actual: handler.type_name().to_string(),
            }
            .into());
        }
        let invoker = binding
            .invokers
            .get(method)
            .ok_or_else(|| MetadataError::NoSuchOperation {
                handler: name.to_string(),
                method: method.clone(),
            })?;
        invoker(handler, request).map_err(|err| match err {
            InvokeError::Http(http) => ExecuteError::Http(http),
            InvokeError::TypeMismatch { expected } => {
                ExecuteError::Metadata(MetadataError::InvalidHandlerObject {
                    handler: name.to_string(),
                    expected: expected.to_string(),
                    actual: handler.type_name().to_string(),
                })
            }
        })
    }

    /// Persist the current state if any handler was loaded this process
    /// lifetime.
    ///
    /// The host calls this once at a well-defined shutdown point; nothing is
    /// written when the state is clean or persistence is off.
    pub fn flush(&self) {
        if !self.persist {
            return;
        }
        let mut state = self.state.write().expect("metadata lock poisoned");
        if !state.dirty {
            return;
        }
        let persisted = PersistedState {
            handlers: state
                .handlers
                .iter()
                .map(|(name, meta)| (name.clone(), PersistedHandler::from_runtime(meta)))
                .collect(),
        };
        match serde_json::to_vec(&persisted) {
            Ok(bytes) => {
                self.cache.set(METADATA_CACHE_KEY, &bytes);
                state.dirty = false;
                info!(handlers = state.handlers.len(), "handler metadata flushed");
            }
            Err(error) => warn!(%error, "failed to encode handler metadata blob"),
        }
    }
}
