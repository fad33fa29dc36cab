use crate::error::HttpError;
use crate::media::MediaRangeList;
use crate::request::Request;
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A handler instance as seen by the dispatch layer.
///
/// Blanket-implemented for every `'static + Send + Sync` type; the `Any`
/// access lets the store verify at execution time that the instance it is
/// given matches the type recorded when the metadata was loaded.
pub trait Handler: Send + Sync + 'static {
    /// Access the concrete instance for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// The concrete type name, for error reporting.
    fn type_name(&self) -> &'static str;
}

impl<T: Send + Sync + 'static> Handler for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Declarative self-description implemented by handler types.
///
/// This is the registration front-end replacing runtime reflection: the
/// handler states its routes, negotiation descriptors, and operations once,
/// and the store reads them through a [`crate::metadata::DescriptorSource`].
pub trait Describe {
    /// Produce the handler's full description.
    fn describe() -> HandlerDescription;
}

/// Associates a path pattern with the declaring handler.
///
/// Patterns contain literal segments, variable segments `{name}` or
/// `{name:regex}`, and trailing bracket-delimited optional parts
/// (`/users[/{id}]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Route name; defaults to the pattern when absent.
    pub name: Option<String>,
    /// Path pattern.
    pub pattern: String,
    /// Default values merged into matched parameters (captures win).
    pub defaults: Map<String, Value>,
    /// Higher priority routes are matched first.
    pub priority: i32,
}

impl RouteDescriptor {
    /// Create a route for the given pattern with no name, defaults, or
    /// priority.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            name: None,
            pattern: pattern.into(),
            defaults: Map::new(),
            priority: 0,
        }
    }

    /// Set an explicit route name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a default parameter value.
    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }

    /// Set the route priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The route name after defaulting: the declared name, else the pattern.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.pattern)
    }
}

/// Associates a request-body parser with a handler or operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerDescriptor {
    /// Declared media range; may contain wildcards (`application/*`).
    pub media_range: String,
    /// Consumer plugin name resolved through the consumer registry.
    pub name: String,
    /// Options passed to the plugin factory.
    pub options: Option<Value>,
    /// Higher priority consumers are tried first.
    pub priority: i32,
    /// Parsed form of `media_range`; hydrated at load and after blob decode.
    #[serde(skip)]
    pub(crate) ranges: Option<MediaRangeList>,
}

impl ConsumerDescriptor {
    /// Create a consumer descriptor for the given media range and plugin.
    #[must_use]
    pub fn new(media_range: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            media_range: media_range.into(),
            name: name.into(),
            options: None,
            priority: 0,
            ranges: None,
        }
    }

    /// Set plugin options.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the descriptor priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this consumer's declared range covers the raw `Content-Type`
    /// header value.
    #[must_use]
    pub fn matches(&self, content_type: &str) -> bool {
        match &self.ranges {
            Some(ranges) => ranges.matches(content_type),
            // Not hydrated: fall back to a one-off parse rather than panic.
            None => MediaRangeList::parse(&self.media_range)
                .map(|ranges| ranges.matches(content_type))
                .unwrap_or(false),
        }
    }
}

/// Associates a response-body assembler with a handler or operation.
///
/// Producers declare a concrete media type — no wildcard on the declaring
/// side; it is matched against the parsed `Accept` ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerDescriptor {
    /// Concrete media type written to the response `Content-Type`.
    pub media_type: String,
    /// Producer plugin name resolved through the producer registry.
    pub name: String,
    /// Options passed to the plugin factory.
    pub options: Option<Value>,
    /// Higher priority producers are tried first.
    pub priority: i32,
}

impl ProducerDescriptor {
    /// Create a producer descriptor for the given media type and plugin.
    #[must_use]
    pub fn new(media_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            name: name.into(),
            options: None,
            priority: 0,
        }
    }

    /// Set plugin options.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the descriptor priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Associates a request-transforming step with a handler or operation.
///
/// "Attribute" is the domain term for a pre-handler request mutation; it is
/// unrelated to Rust's `#[...]` attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute plugin name resolved through the attribute registry.
    pub name: String,
    /// Options passed to the plugin factory.
    pub options: Option<Value>,
    /// Higher priority attributes run first.
    pub priority: i32,
}

impl AttributeDescriptor {
    /// Create an attribute descriptor for the given plugin.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: None,
            priority: 0,
        }
    }

    /// Set plugin options.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the descriptor priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Stable priority queue for descriptors.
///
/// Ordering is descending priority with ties broken by insertion sequence
/// number. The tie-break is explicit so that cloning a handler-level queue
/// and pushing operation-level entries on top keeps handler-level entries
/// ahead at equal priority.
#[derive(Debug, Clone)]
pub(crate) struct DescriptorQueue<T> {
    entries: Vec<QueueEntry<T>>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct QueueEntry<T> {
    priority: i32,
    seq: u64,
    item: T,
}

impl<T> Default for DescriptorQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T> DescriptorQueue<T> {
    pub(crate) fn push(&mut self, priority: i32, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(QueueEntry {
            priority,
            seq,
            item,
        });
    }

    /// Drain into a vector ordered by (priority desc, insertion seq asc).
    pub(crate) fn into_sorted(mut self) -> Vec<T> {
        self.entries
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        self.entries.into_iter().map(|entry| entry.item).collect()
    }
}

/// Error returned by an operation invoker.
#[derive(Debug)]
pub enum InvokeError {
    /// The operation raised an HTTP-code error; rendered as a response.
    Http(HttpError),
    /// The handler instance did not downcast to the declaring type.
    TypeMismatch {
        /// Type the operation was declared for.
        expected: &'static str,
    },
}

impl From<HttpError> for InvokeError {
    fn from(err: HttpError) -> Self {
        InvokeError::Http(err)
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeError::Http(err) => write!(f, "{err}"),
            InvokeError::TypeMismatch { expected } => {
                write!(f, "handler instance is not a {expected}")
            }
        }
    }
}

impl std::error::Error for InvokeError {}

/// Type-erased operation entry point.
pub type Invoker =
    Arc<dyn Fn(&dyn Handler, &mut Request) -> Result<Value, InvokeError> + Send + Sync>;

/// One HTTP-method-bearing operation of a handler.
pub struct Operation {
    pub(crate) http_method: Method,
    pub(crate) name: String,
    pub(crate) consumers: Vec<ConsumerDescriptor>,
    pub(crate) attributes: Vec<AttributeDescriptor>,
    pub(crate) producers: Vec<ProducerDescriptor>,
    pub(crate) invoker: Invoker,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("http_method", &self.http_method)
            .field("name", &self.name)
            .field("consumers", &self.consumers)
            .field("attributes", &self.attributes)
            .field("producers", &self.producers)
            .finish_non_exhaustive()
    }
}

impl Operation {
    /// Declare an operation bound to an HTTP method.
    ///
    /// The closure receives the concrete handler instance and the request;
    /// the instance is downcast from the type-erased handler, and a mismatch
    /// surfaces as [`InvokeError::TypeMismatch`].
    pub fn new<H, F>(http_method: Method, name: impl Into<String>, f: F) -> Self
    where
        H: Handler,
        F: Fn(&H, &mut Request) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |handler, request| {
            let concrete =
                handler
                    .as_any()
                    .downcast_ref::<H>()
                    .ok_or(InvokeError::TypeMismatch {
                        expected: std::any::type_name::<H>(),
                    })?;
            f(concrete, request).map_err(InvokeError::Http)
        });
        Self {
            http_method,
            name: name.into(),
            consumers: Vec::new(),
            attributes: Vec::new(),
            producers: Vec::new(),
            invoker,
        }
    }

    /// Declare a GET operation.
    pub fn get<H, F>(name: impl Into<String>, f: F) -> Self
    where
        H: Handler,
        F: Fn(&H, &mut Request) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        Self::new(Method::GET, name, f)
    }

    /// Declare a POST operation.
    pub fn post<H, F>(name: impl Into<String>, f: F) -> Self
    where
        H: Handler,
        F: Fn(&H, &mut Request) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        Self::new(Method::POST, name, f)
    }

    /// Declare a PUT operation.
    pub fn put<H, F>(name: impl Into<String>, f: F) -> Self
    where
        H: Handler,
        F: Fn(&H, &mut Request) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        Self::new(Method::PUT, name, f)
    }

    /// Declare a DELETE operation.
    pub fn delete<H, F>(name: impl Into<String>, f: F) -> Self
    where
        H: Handler,
        F: Fn(&H, &mut Request) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        Self::new(Method::DELETE, name, f)
    }

    /// Declare a PATCH operation.
    pub fn patch<H, F>(name: impl Into<String>, f: F) -> Self
    where
        H: Handler,
        F: Fn(&H, &mut Request) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        Self::new(Method::PATCH, name, f)
    }

    /// Add an operation-level consumer.
    #[must_use]
    pub fn consumes(mut self, descriptor: ConsumerDescriptor) -> Self {
        self.consumers.push(descriptor);
        self
    }

    /// Add an operation-level attribute.
    #[must_use]
    pub fn attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes.push(descriptor);
        self
    }

    /// Add an operation-level producer.
    #[must_use]
    pub fn produces(mut self, descriptor: ProducerDescriptor) -> Self {
        self.producers.push(descriptor);
        self
    }
}

/// Everything one handler declares: routes, handler-level common
/// descriptors, and its operations.
///
/// Handler-level descriptors apply to every operation; they are merged with
/// operation-level descriptors through the stable priority queue, so they
/// sort ahead of operation-level entries of equal priority.
#[derive(Debug, Default)]
pub struct HandlerDescription {
    pub(crate) routes: Vec<RouteDescriptor>,
    pub(crate) consumers: Vec<ConsumerDescriptor>,
    pub(crate) attributes: Vec<AttributeDescriptor>,
    pub(crate) producers: Vec<ProducerDescriptor>,
    pub(crate) operations: Vec<Operation>,
}

impl HandlerDescription {
    /// Start an empty description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a route.
    #[must_use]
    pub fn route(mut self, descriptor: RouteDescriptor) -> Self {
        self.routes.push(descriptor);
        self
    }

    /// Declare a handler-level consumer applied to every operation.
    #[must_use]
    pub fn consumes(mut self, descriptor: ConsumerDescriptor) -> Self {
        self.consumers.push(descriptor);
        self
    }

    /// Declare a handler-level attribute applied to every operation.
    #[must_use]
    pub fn attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes.push(descriptor);
        self
    }

    /// Declare a handler-level producer applied to every operation.
    #[must_use]
    pub fn produces(mut self, descriptor: ProducerDescriptor) -> Self {
        self.producers.push(descriptor);
        self
    }

    /// Declare an operation.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }
}
