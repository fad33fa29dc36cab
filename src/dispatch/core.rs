use crate::error::HttpError;
use crate::media::MediaRangeList;
use crate::metadata::{ExecuteError, HandlerResolver, MetadataError, MetadataStore};
use crate::plugin::{Attribute, Consumer, Producer};
use crate::registry::{Registry, RegistryError};
use crate::request::Request;
use crate::response::Response;
use crate::HANDLER_ATTRIBUTE;
use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Fatal dispatch failures.
///
/// None of these are client errors: they indicate a misconfigured service
/// (metadata referring to unregistered plugins, a missing routing layer, a
/// broken producer) and propagate to the hosting runtime instead of being
/// rendered as responses.
#[derive(Debug)]
pub enum DispatchError {
    /// The request carried no handler name attribute; the routing layer did
    /// not run.
    MissingHandlerAttribute,
    /// A consumer descriptor referred to an unregistered consumer.
    InvalidConsumer(RegistryError),
    /// A producer descriptor referred to an unregistered producer.
    InvalidProducer(RegistryError),
    /// An attribute descriptor referred to an unregistered attribute.
    InvalidAttribute(RegistryError),
    /// The handler resolver failed.
    HandlerResolution {
        /// Handler name.
        handler: String,
        /// Resolver failure.
        source: anyhow::Error,
    },
    /// Metadata loading or execution failed.
    Metadata(MetadataError),
    /// The selected producer failed to assemble a body.
    ProducerFailure {
        /// Producer plugin name.
        producer: String,
        /// Assembly failure.
        source: anyhow::Error,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MissingHandlerAttribute => {
                write!(f, "request carries no handler attribute")
            }
            DispatchError::InvalidConsumer(err) => write!(f, "{err}"),
            DispatchError::InvalidProducer(err) => write!(f, "{err}"),
            DispatchError::InvalidAttribute(err) => write!(f, "{err}"),
            DispatchError::HandlerResolution { handler, source } => {
                write!(f, "failed to resolve handler '{handler}': {source:#}")
            }
            DispatchError::Metadata(err) => write!(f, "{err}"),
            DispatchError::ProducerFailure { producer, source } => {
                write!(f, "producer '{producer}' failed to assemble body: {source:#}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<MetadataError> for DispatchError {
    fn from(err: MetadataError) -> Self {
        DispatchError::Metadata(err)
    }
}

/// Outcome channel inside one dispatch: client errors become responses,
/// fatal errors bubble out of `handle`.
enum Failure {
    Client(HttpError),
    Fatal(DispatchError),
}

impl From<HttpError> for Failure {
    fn from(err: HttpError) -> Self {
        Failure::Client(err)
    }
}

impl From<DispatchError> for Failure {
    fn from(err: DispatchError) -> Self {
        Failure::Fatal(err)
    }
}

impl From<MetadataError> for Failure {
    fn from(err: MetadataError) -> Self {
        Failure::Fatal(DispatchError::Metadata(err))
    }
}

/// The producer chosen for this request.
struct SelectedProducer {
    name: String,
    media_type: String,
    producer: Arc<dyn Producer>,
}

/// Request-dispatch middleware.
///
/// Shared, process-lifetime object: all per-request state lives on the
/// stack of [`DispatchMiddleware::handle`].
pub struct DispatchMiddleware {
    store: Arc<MetadataStore>,
    handlers: Arc<dyn HandlerResolver>,
    consumers: Arc<Registry<dyn Consumer>>,
    producers: Arc<Registry<dyn Producer>>,
    attributes: Arc<Registry<dyn Attribute>>,
}

impl DispatchMiddleware {
    /// Assemble the middleware from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<MetadataStore>,
        handlers: Arc<dyn HandlerResolver>,
        consumers: Arc<Registry<dyn Consumer>>,
        producers: Arc<Registry<dyn Producer>>,
        attributes: Arc<Registry<dyn Attribute>>,
    ) -> Self {
        Self {
            store,
            handlers,
            consumers,
            producers,
            attributes,
        }
    }

    /// Dispatch one request to its handler and assemble the response.
    ///
    /// # Errors
    ///
    /// Only configuration/programming failures ([`DispatchError`]); all
    /// client-input problems come back as 4xx responses.
    pub fn handle(&self, mut request: Request) -> Result<Response, DispatchError> {
        let handler = request
            .attribute(HANDLER_ATTRIBUTE)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(DispatchError::MissingHandlerAttribute)?;
        let method = request.method.clone();
        debug!(handler = %handler, method = %method, path = %request.path, "dispatch start");

        // Producer selection runs before the response-rendering scope opens:
        // its client failures (bad Accept, nothing acceptable) render bare,
        // with no producer involved.
        let selected = match self.select_producer(&handler, &method, &request) {
            Ok(selected) => selected,
            Err(Failure::Client(err)) => {
                info!(handler = %handler, status = err.status, "dispatch rejected before negotiation completed");
                return Ok(Self::render_bare(&err));
            }
            Err(Failure::Fatal(err)) => return Err(err),
        };

        let mut response = Response::new();
        if let Some(selected) = &selected {
            response.set_header("Content-Type", selected.media_type.clone());
        }

        match self.run(&handler, &method, &mut request) {
            Ok(result) => {
                self.populate(&mut response, selected.as_ref(), &result)?;
            }
            Err(Failure::Client(err)) => {
                // The error payload goes through the same producer as a
                // success result; status and headers come from the error.
                self.populate(&mut response, selected.as_ref(), &err.payload)?;
                for (name, value) in &err.headers {
                    response.set_header(name, value.clone());
                }
                response.set_status(err.status, err.reason.clone());
            }
            Err(Failure::Fatal(err)) => return Err(err),
        }

        info!(
            handler = %handler,
            method = %method,
            status = response.status,
            "dispatch complete"
        );
        Ok(response)
    }

    /// Steps 3–5: consumer selection, attributes, handler execution.
    fn run(
        &self,
        handler: &str,
        method: &Method,
        request: &mut Request,
    ) -> Result<Value, Failure> {
        self.apply_consumers(handler, method, request)?;
        self.apply_attributes(handler, method, request)?;

        let instance =
            self.handlers
                .resolve(handler)
                .map_err(|source| DispatchError::HandlerResolution {
                    handler: handler.to_string(),
                    source,
                })?;
        self.store
            .execute(handler, method, instance.as_ref(), request)
            .map_err(|err| match err {
                ExecuteError::Http(err) => Failure::Client(err),
                ExecuteError::Metadata(err) => Failure::Fatal(DispatchError::Metadata(err)),
            })
    }

    /// Select the producer for the request's `Accept` header, if the handler
    /// declares producers for this method.
    fn select_producer(
        &self,
        handler: &str,
        method: &Method,
        request: &Request,
    ) -> Result<Option<SelectedProducer>, Failure> {
        if !self.store.has_producers(handler, method)? {
            return Ok(None);
        }

        let values = request.header_values("accept");
        let accept = if values.is_empty() {
            "*/*".to_string()
        } else {
            values.join(", ")
        };
        let ranges = MediaRangeList::parse(&accept).map_err(|error| {
            debug!(header = %accept, %error, "Accept header rejected");
            HttpError::bad_request("Invalid Accept header")
        })?;

        for descriptor in self.store.producers(handler, method)? {
            if ranges.matches(&descriptor.media_type) {
                let producer = self
                    .producers
                    .resolve(&descriptor.name, descriptor.options.as_ref())
                    .map_err(DispatchError::InvalidProducer)?;
                debug!(
                    producer = %descriptor.name,
                    media_type = %descriptor.media_type,
                    "producer selected"
                );
                return Ok(Some(SelectedProducer {
                    name: descriptor.name,
                    media_type: descriptor.media_type,
                    producer,
                }));
            }
        }
        Err(HttpError::not_acceptable().into())
    }

    /// Select and run the consumer for the request's `Content-Type`, if the
    /// handler declares consumers for this method.
    fn apply_consumers(
        &self,
        handler: &str,
        method: &Method,
        request: &mut Request,
    ) -> Result<(), Failure> {
        if !self.store.has_consumers(handler, method)? {
            return Ok(());
        }

        let values = request.header_values("content-type");
        let content_type = match values.as_slice() {
            [] => {
                return Err(HttpError::bad_request("Content-Type header is not declared").into())
            }
            [one] => (*one).to_string(),
            _ => return Err(HttpError::bad_request("Multiple Content-Type headers").into()),
        };
        let parsed = MediaRangeList::parse(&content_type).map_err(|error| {
            debug!(header = %content_type, %error, "Content-Type header rejected");
            HttpError::bad_request("Invalid Content-Type header")
        })?;
        let Some(range) = parsed.ranges().first() else {
            return Err(HttpError::bad_request("Invalid Content-Type header").into());
        };
        let media_type = format!("{}/{}", range.main_type, range.subtype);
        let parameters = range.parameters.clone();

        for descriptor in self.store.consumers(handler, method)? {
            if descriptor.matches(&content_type) {
                let consumer = self
                    .consumers
                    .resolve(&descriptor.name, descriptor.options.as_ref())
                    .map_err(DispatchError::InvalidConsumer)?;
                debug!(consumer = %descriptor.name, media_type = %media_type, "consumer selected");
                let parsed_body = consumer
                    .parse(
                        &request.body,
                        request.parsed_body.as_ref(),
                        &media_type,
                        &parameters,
                    )
                    .map_err(Failure::Client)?;
                request.parsed_body = Some(parsed_body);
                return Ok(());
            }
        }
        Err(HttpError::unsupported_media_type().into())
    }

    /// Apply each attribute in priority order, threading the request through.
    fn apply_attributes(
        &self,
        handler: &str,
        method: &Method,
        request: &mut Request,
    ) -> Result<(), Failure> {
        for descriptor in self.store.attributes(handler, method)? {
            let attribute = self
                .attributes
                .resolve(&descriptor.name, descriptor.options.as_ref())
                .map_err(DispatchError::InvalidAttribute)?;
            debug!(attribute = %descriptor.name, "attribute applied");
            let owned = std::mem::replace(request, Request::new(method.clone(), String::new()));
            *request = attribute.apply(owned).map_err(Failure::Client)?;
        }
        Ok(())
    }

    /// Populate the response body (and producer headers) from a value.
    fn populate(
        &self,
        response: &mut Response,
        selected: Option<&SelectedProducer>,
        data: &Value,
    ) -> Result<(), DispatchError> {
        let Some(selected) = selected else {
            return Ok(());
        };
        let body = selected
            .producer
            .assemble(data)
            .map_err(|source| DispatchError::ProducerFailure {
                producer: selected.name.clone(),
                source,
            })?;
        if let Some(bytes) = body {
            response.body = bytes;
        }
        for (name, value) in selected.producer.assemble_headers(data) {
            response.set_header(&name, value);
        }
        Ok(())
    }

    /// Render an error with no producer: status, reason, and headers from the
    /// error; body best-effort from the payload alone.
    fn render_bare(err: &HttpError) -> Response {
        let mut response = Response::new();
        response.set_status(err.status, err.reason.clone());
        for (name, value) in &err.headers {
            response.set_header(name, value.clone());
        }
        match &err.payload {
            Value::Null => {}
            Value::String(text) => response.body = text.clone().into_bytes(),
            other => response.body = serde_json::to_vec(other).unwrap_or_default(),
        }
        response
    }
}
