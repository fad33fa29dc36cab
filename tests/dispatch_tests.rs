//! End-to-end tests for the dispatch middleware.
//!
//! # Test Coverage
//!
//! Validates the full per-request sequence against a mounted handler:
//! - Producer selection via Accept negotiation (success, 406, bad header)
//! - Consumer selection via Content-Type negotiation (success, 415, missing
//!   and duplicate headers)
//! - Attribute application order and 422 error rendering
//! - Handler invocation with routed path parameters
//! - The client-error / configuration-error split: plugin resolution
//!   failures surface as `Err(DispatchError)`, never as 4xx responses

use serde_json::{json, Value};
use std::sync::Arc;

use http::Method;
use waymark::cache::MemoryCacheStore;
use waymark::dispatch::{DispatchError, DispatchMiddleware};
use waymark::error::HttpError;
use waymark::metadata::{
    AttributeDescriptor, ConsumerDescriptor, Describe, DescriptorSource, HandlerDescription,
    HandlerResolver, MetadataStore, Operation, ProducerDescriptor, RouteDescriptor,
};
use waymark::plugin::{default_consumers, default_producers, Attribute, Producer};
use waymark::registry::{HandlerRegistry, Registry};
use waymark::request::Request;
use waymark::response::Response;
use waymark::router::{MatchOutcome, RouteTable};

use tracing_util::TestTracing;

/// Handler under test: GET with a JSON producer, POST with a JSON-only
/// consumer, PUT guarded by a validating attribute.
struct Items;

impl Describe for Items {
    fn describe() -> HandlerDescription {
        HandlerDescription::new()
            .route(RouteDescriptor::new("/items/{id}"))
            .operation(Operation::get("read", |_: &Items, req: &mut Request| {
                let id = req
                    .attribute("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(json!({ "id": id }))
            })
            .produces(ProducerDescriptor::new("application/json", "json")))
            .operation(
                Operation::post("create", |_: &Items, req: &mut Request| {
                    Ok(json!({ "received": req.parsed_body.clone() }))
                })
                .consumes(ConsumerDescriptor::new("application/json", "json"))
                .produces(ProducerDescriptor::new("application/json", "json")),
            )
            .operation(
                Operation::put("replace", |_: &Items, _req: &mut Request| {
                    Ok(json!({ "replaced": true }))
                })
                .attribute(AttributeDescriptor::new("transfer"))
                .produces(ProducerDescriptor::new("application/json", "json")),
            )
    }
}

/// Attribute that rejects every request with a structured error map, the way
/// a wrapped transfer service reports validation failures.
struct FailingTransfer;

impl Attribute for FailingTransfer {
    fn apply(&self, _request: Request) -> Result<Request, HttpError> {
        Err(HttpError::unprocessable(json!({ "field": "required" })))
    }
}

struct Fixture {
    table: RouteTable,
    middleware: DispatchMiddleware,
    store: Arc<MetadataStore>,
}

impl Fixture {
    fn new() -> Self {
        let mut handlers = HandlerRegistry::new();
        handlers.register_instance("items", Arc::new(Items));
        Self::with_handlers(handlers)
    }

    fn with_handlers(handlers: HandlerRegistry) -> Self {
        let handlers = Arc::new(handlers);
        let cache = Arc::new(MemoryCacheStore::new());
        let store = Arc::new(MetadataStore::new(
            Arc::clone(&handlers) as Arc<dyn HandlerResolver>,
            Arc::clone(&handlers) as Arc<dyn DescriptorSource>,
            Arc::clone(&cache) as Arc<dyn waymark::cache::CacheStore>,
        ));
        let table = RouteTable::new(cache);

        let mut attributes: Registry<dyn Attribute> = Registry::new("attribute");
        attributes.register_instance("transfer", Arc::new(FailingTransfer));

        let middleware = DispatchMiddleware::new(
            Arc::clone(&store),
            handlers,
            Arc::new(default_consumers()),
            Arc::new(default_producers()),
            Arc::new(attributes),
        );
        Self {
            table,
            middleware,
            store,
        }
    }

    /// Route and dispatch, the way a host wires the two layers together.
    fn dispatch(&self, mut request: Request) -> Result<Response, DispatchError> {
        match self.table.route_request(&mut request).expect("routing") {
            MatchOutcome::Found(_) => self.middleware.handle(request),
            MatchOutcome::MethodNotAllowed { .. } => panic!("unexpected 405 in fixture"),
            MatchOutcome::NotFound => panic!("unexpected 404 in fixture"),
        }
    }
}

#[test]
fn test_get_with_matching_accept_returns_json() {
    let _tracing = TestTracing::init();
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request =
        Request::new(Method::GET, "/items/42").with_header("Accept", "application/json");
    let response = fixture.dispatch(request).expect("dispatch");

    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("Content-Type"), Some("application/json"));
    let body: Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body, json!({ "id": "42" }));
}

#[test]
fn test_unmatched_accept_is_406_with_empty_body() {
    let _tracing = TestTracing::init();
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::GET, "/items/42").with_header("Accept", "text/xml");
    let response = fixture.dispatch(request).expect("dispatch");

    assert_eq!(response.status, 406);
    assert!(response.body.is_empty());
    // Rendered bare: no producer ran, so no negotiated Content-Type either.
    assert_eq!(response.get_header("Content-Type"), None);
}

#[test]
fn test_missing_accept_defaults_to_full_wildcard() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let response = fixture
        .dispatch(Request::new(Method::GET, "/items/42"))
        .expect("dispatch");
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("Content-Type"), Some("application/json"));
}

#[test]
fn test_malformed_accept_is_400() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::GET, "/items/42").with_header("Accept", "nonsense");
    let response = fixture.dispatch(request).expect("dispatch");
    assert_eq!(response.status, 400);
    assert_eq!(response.reason_phrase(), "Invalid Accept header");
}

#[test]
fn test_unsupported_content_type_is_415() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::POST, "/items/42")
        .with_header("Accept", "application/json")
        .with_header("Content-Type", "text/plain")
        .with_body("hello");
    let response = fixture.dispatch(request).expect("dispatch");
    assert_eq!(response.status, 415);
}

#[test]
fn test_matching_content_type_parses_body() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::POST, "/items/42")
        .with_header("Content-Type", "application/json; charset=utf-8")
        .with_body(r#"{"name":"thing"}"#);
    let response = fixture.dispatch(request).expect("dispatch");

    assert_eq!(response.status, 200);
    let body: Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body, json!({ "received": { "name": "thing" } }));
}

#[test]
fn test_missing_content_type_is_400() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::POST, "/items/42").with_body("{}");
    let response = fixture.dispatch(request).expect("dispatch");
    assert_eq!(response.status, 400);
    assert_eq!(response.reason_phrase(), "Content-Type header is not declared");
}

#[test]
fn test_duplicate_content_type_is_400() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::POST, "/items/42")
        .with_header("Content-Type", "application/json")
        .with_header("Content-Type", "application/json")
        .with_body("{}");
    let response = fixture.dispatch(request).expect("dispatch");
    assert_eq!(response.status, 400);
    assert_eq!(response.reason_phrase(), "Multiple Content-Type headers");
}

#[test]
fn test_malformed_json_body_is_400_through_producer() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::POST, "/items/42")
        .with_header("Content-Type", "application/json")
        .with_body("{broken");
    let response = fixture.dispatch(request).expect("dispatch");
    assert_eq!(response.status, 400);
    // Consumer errors happen inside the producer scope: the negotiated
    // Content-Type stays on the response.
    assert_eq!(response.get_header("Content-Type"), Some("application/json"));
}

#[test]
fn test_attribute_error_renders_422_with_exact_payload() {
    let _tracing = TestTracing::init();
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request =
        Request::new(Method::PUT, "/items/42").with_header("Accept", "application/json");
    let response = fixture.dispatch(request).expect("dispatch");

    assert_eq!(response.status, 422);
    assert_eq!(response.reason_phrase(), "Unprocessable Entity");
    let body: Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body, json!({ "field": "required" }));
    assert_eq!(response.get_header("Content-Type"), Some("application/json"));
}

#[test]
fn test_attributes_run_in_priority_order_and_thread_the_request() {
    struct Tagging(&'static str);
    impl Attribute for Tagging {
        fn apply(&self, mut request: Request) -> Result<Request, HttpError> {
            let mut seen = request
                .attribute("seen")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            seen.push(json!(self.0));
            request.set_attribute("seen", Value::Array(seen));
            Ok(request)
        }
    }

    struct Ordered;
    impl Describe for Ordered {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/ordered"))
                .attribute(AttributeDescriptor::new("late").with_priority(-5))
                .attribute(AttributeDescriptor::new("early").with_priority(5))
                .operation(Operation::get("read", |_: &Ordered, req: &mut Request| {
                    Ok(req.attribute("seen").cloned().unwrap_or(Value::Null))
                })
                .attribute(AttributeDescriptor::new("middle"))
                .produces(ProducerDescriptor::new("application/json", "json")))
        }
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register_instance("ordered", Arc::new(Ordered));
    let handlers = Arc::new(handlers);
    let cache = Arc::new(MemoryCacheStore::new());
    let store = Arc::new(MetadataStore::new(
        Arc::clone(&handlers) as Arc<dyn HandlerResolver>,
        Arc::clone(&handlers) as Arc<dyn DescriptorSource>,
        cache,
    ));

    let mut attributes: Registry<dyn Attribute> = Registry::new("attribute");
    attributes.register_instance("early", Arc::new(Tagging("early")));
    attributes.register_instance("middle", Arc::new(Tagging("middle")));
    attributes.register_instance("late", Arc::new(Tagging("late")));

    let middleware = DispatchMiddleware::new(
        store,
        handlers,
        Arc::new(default_consumers()),
        Arc::new(default_producers()),
        Arc::new(attributes),
    );

    let request = Request::new(Method::GET, "/ordered")
        .with_attribute(waymark::HANDLER_ATTRIBUTE, json!("ordered"));
    let response = middleware.handle(request).expect("dispatch");
    let body: Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body, json!(["early", "middle", "late"]));
}

#[test]
fn test_unregistered_producer_is_fatal_not_4xx() {
    struct Broken;
    impl Describe for Broken {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/broken"))
                .operation(Operation::get("read", |_: &Broken, _req: &mut Request| {
                    Ok(Value::Null)
                })
                .produces(ProducerDescriptor::new("application/json", "ghost")))
        }
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register_instance("broken", Arc::new(Broken));
    let fixture = Fixture::with_handlers(handlers);
    fixture.table.mount("broken", &fixture.store).expect("mount");

    let request = Request::new(Method::GET, "/broken");
    let mut routed = request;
    fixture.table.route_request(&mut routed).expect("routing");
    match fixture.middleware.handle(routed) {
        Err(DispatchError::InvalidProducer(err)) => assert_eq!(err.name, "ghost"),
        other => panic!("expected InvalidProducer, got {other:?}"),
    }
}

#[test]
fn test_unregistered_attribute_is_fatal_not_4xx() {
    struct Broken;
    impl Describe for Broken {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/broken"))
                .operation(Operation::get("read", |_: &Broken, _req: &mut Request| {
                    Ok(Value::Null)
                })
                .attribute(AttributeDescriptor::new("ghost")))
        }
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register_instance("broken", Arc::new(Broken));
    let fixture = Fixture::with_handlers(handlers);
    fixture.table.mount("broken", &fixture.store).expect("mount");

    let mut request = Request::new(Method::GET, "/broken");
    fixture.table.route_request(&mut request).expect("routing");
    assert!(matches!(
        fixture.middleware.handle(request),
        Err(DispatchError::InvalidAttribute(_))
    ));
}

#[test]
fn test_handler_without_producers_returns_empty_body() {
    struct Quiet;
    impl Describe for Quiet {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/quiet"))
                .operation(Operation::get("read", |_: &Quiet, _req: &mut Request| {
                    Ok(json!({ "ignored": true }))
                }))
        }
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register_instance("quiet", Arc::new(Quiet));
    let fixture = Fixture::with_handlers(handlers);
    fixture.table.mount("quiet", &fixture.store).expect("mount");

    let mut request = Request::new(Method::GET, "/quiet");
    fixture.table.route_request(&mut request).expect("routing");
    let response = fixture.middleware.handle(request).expect("dispatch");
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(response.get_header("Content-Type"), None);
}

#[test]
fn test_producer_headers_merge_into_response() {
    struct Tagged;
    impl Producer for Tagged {
        fn assemble(&self, data: &Value) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(Some(serde_json::to_vec(data)?))
        }
        fn assemble_headers(&self, data: &Value) -> Vec<(String, String)> {
            vec![(
                "X-Item-Count".to_string(),
                data.as_array().map_or(0, Vec::len).to_string(),
            )]
        }
    }

    struct Listing;
    impl Describe for Listing {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/listing"))
                .operation(Operation::get("read", |_: &Listing, _req: &mut Request| {
                    Ok(json!([1, 2, 3]))
                })
                .produces(ProducerDescriptor::new("application/json", "tagged")))
        }
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register_instance("listing", Arc::new(Listing));
    let handlers = Arc::new(handlers);
    let cache = Arc::new(MemoryCacheStore::new());
    let store = Arc::new(MetadataStore::new(
        Arc::clone(&handlers) as Arc<dyn HandlerResolver>,
        Arc::clone(&handlers) as Arc<dyn DescriptorSource>,
        cache,
    ));
    let mut producers = default_producers();
    producers.register_instance("tagged", Arc::new(Tagged));
    let middleware = DispatchMiddleware::new(
        store,
        handlers,
        Arc::new(default_consumers()),
        Arc::new(producers),
        Arc::new(Registry::<dyn Attribute>::new("attribute")),
    );

    let request = Request::new(Method::GET, "/listing")
        .with_attribute(waymark::HANDLER_ATTRIBUTE, json!("listing"));
    let response = middleware.handle(request).expect("dispatch");
    assert_eq!(response.get_header("X-Item-Count"), Some("3"));
    assert_eq!(response.get_header("Content-Type"), Some("application/json"));
}

#[test]
fn test_handler_raised_http_error_renders_through_producer() {
    struct Guarded;
    impl Describe for Guarded {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/guarded/{id}"))
                .operation(Operation::get("read", |_: &Guarded, req: &mut Request| {
                    match req.attribute("id").and_then(Value::as_str) {
                        Some("known") => Ok(json!({ "ok": true })),
                        _ => Err(HttpError::not_found()
                            .with_payload(json!({ "error": "no such item" }))),
                    }
                })
                .produces(ProducerDescriptor::new("application/json", "json")))
        }
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register_instance("guarded", Arc::new(Guarded));
    let fixture = Fixture::with_handlers(handlers);
    fixture.table.mount("guarded", &fixture.store).expect("mount");

    let mut request = Request::new(Method::GET, "/guarded/other");
    fixture.table.route_request(&mut request).expect("routing");
    let response = fixture.middleware.handle(request).expect("dispatch");
    assert_eq!(response.status, 404);
    let body: Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(body, json!({ "error": "no such item" }));
}

#[test]
fn test_request_without_routing_attribute_is_fatal() {
    let fixture = Fixture::new();
    fixture.table.mount("items", &fixture.store).expect("mount");

    let request = Request::new(Method::GET, "/items/42");
    assert!(matches!(
        fixture.middleware.handle(request),
        Err(DispatchError::MissingHandlerAttribute)
    ));
}
