use super::descriptors::DescriptorQueue;
use super::*;
use crate::cache::{CacheStore, MemoryCacheStore};
use crate::request::Request;
use http::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Alpha;

impl Describe for Alpha {
    fn describe() -> HandlerDescription {
        HandlerDescription::new()
            .route(RouteDescriptor::new("/alpha"))
            .consumes(ConsumerDescriptor::new("application/json", "json"))
            .operation(Operation::get(
                "read",
                |_: &Alpha, _req: &mut Request| Ok(json!({"handler": "alpha"})),
            ))
    }
}

struct NoRoutes;

impl Describe for NoRoutes {
    fn describe() -> HandlerDescription {
        HandlerDescription::new().operation(Operation::get(
            "read",
            |_: &NoRoutes, _req: &mut Request| Ok(Value::Null),
        ))
    }
}

struct DoubleGet;

impl Describe for DoubleGet {
    fn describe() -> HandlerDescription {
        HandlerDescription::new()
            .route(RouteDescriptor::new("/double"))
            .operation(Operation::get(
                "first",
                |_: &DoubleGet, _req: &mut Request| Ok(Value::Null),
            ))
            .operation(Operation::get(
                "second",
                |_: &DoubleGet, _req: &mut Request| Ok(Value::Null),
            ))
    }
}

/// Registry wrapper counting collaborator calls, to observe reloads and
/// cache-hit behavior.
struct CountingRegistry {
    inner: crate::registry::HandlerRegistry,
    resolves: AtomicUsize,
    describes: AtomicUsize,
}

impl CountingRegistry {
    fn new(inner: crate::registry::HandlerRegistry) -> Arc<Self> {
        Arc::new(Self {
            inner,
            resolves: AtomicUsize::new(0),
            describes: AtomicUsize::new(0),
        })
    }
}

impl HandlerResolver for CountingRegistry {
    fn resolve(&self, name: &str) -> anyhow::Result<Arc<dyn Handler>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(name)
    }
}

impl DescriptorSource for CountingRegistry {
    fn describe(&self, name: &str) -> anyhow::Result<HandlerDescription> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        self.inner.describe(name)
    }
}

fn store_with(
    registry: crate::registry::HandlerRegistry,
    cache: Arc<dyn CacheStore>,
) -> (MetadataStore, Arc<CountingRegistry>) {
    let counting = CountingRegistry::new(registry);
    let store = MetadataStore::new(
        Arc::clone(&counting) as Arc<dyn HandlerResolver>,
        Arc::clone(&counting) as Arc<dyn DescriptorSource>,
        cache,
    );
    (store, counting)
}

#[test]
fn test_queue_orders_by_priority_then_insertion() {
    let mut queue = DescriptorQueue::default();
    queue.push(0, "first-low");
    queue.push(10, "high");
    queue.push(0, "second-low");
    queue.push(10, "second-high");
    assert_eq!(
        queue.into_sorted(),
        vec!["high", "second-high", "first-low", "second-low"]
    );
}

#[test]
fn test_queue_tie_break_is_insertion_order_not_value_order() {
    // Same priorities, reversed declaration order: iteration must follow
    // declaration, never the payload.
    let mut queue = DescriptorQueue::default();
    queue.push(5, "z");
    queue.push(5, "a");
    queue.push(5, "m");
    assert_eq!(queue.into_sorted(), vec!["z", "a", "m"]);
}

#[test]
fn test_handler_level_descriptors_win_priority_ties() {
    struct Mixed;
    impl Describe for Mixed {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/mixed"))
                .consumes(ConsumerDescriptor::new("text/plain", "common"))
                .operation(
                    Operation::post("create", |_: &Mixed, _req: &mut Request| Ok(Value::Null))
                        .consumes(
                            ConsumerDescriptor::new("application/json", "urgent")
                                .with_priority(10),
                        )
                        .consumes(ConsumerDescriptor::new("application/xml", "op-level")),
                )
        }
    }

    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("mixed", Arc::new(Mixed));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    let consumers = store.consumers("mixed", &Method::POST).expect("consumers");
    let names: Vec<&str> = consumers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["urgent", "common", "op-level"]);
}

#[test]
fn test_routes_ordered_by_priority() {
    struct Routed;
    impl Describe for Routed {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/low"))
                .route(RouteDescriptor::new("/high").with_priority(5))
                .route(RouteDescriptor::new("/low-too"))
                .operation(Operation::get(
                    "read",
                    |_: &Routed, _req: &mut Request| Ok(Value::Null),
                ))
        }
    }

    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("routed", Arc::new(Routed));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    let patterns: Vec<String> = store
        .routes("routed")
        .expect("routes")
        .into_iter()
        .map(|r| r.pattern)
        .collect();
    assert_eq!(patterns, vec!["/high", "/low", "/low-too"]);
}

#[test]
fn test_no_routes_is_rejected() {
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("bad", Arc::new(NoRoutes));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    match store.metadata("bad") {
        Err(MetadataError::NoRouteDeclared { handler }) => assert_eq!(handler, "bad"),
        other => panic!("expected NoRouteDeclared, got {other:?}"),
    }
}

#[test]
fn test_duplicate_http_method_is_rejected() {
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("double", Arc::new(DoubleGet));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    match store.metadata("double") {
        Err(MetadataError::DuplicateHttpMethodHandler {
            method,
            first,
            second,
            ..
        }) => {
            assert_eq!(method, Method::GET);
            assert_eq!(first, "first");
            assert_eq!(second, "second");
        }
        other => panic!("expected DuplicateHttpMethodHandler, got {other:?}"),
    }
}

#[test]
fn test_duplicate_route_name_after_defaulting_is_rejected() {
    struct SameName;
    impl Describe for SameName {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/a").with_name("it"))
                .route(RouteDescriptor::new("/b").with_name("it"))
                .operation(Operation::get(
                    "read",
                    |_: &SameName, _req: &mut Request| Ok(Value::Null),
                ))
        }
    }

    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("same", Arc::new(SameName));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    assert!(matches!(
        store.metadata("same"),
        Err(MetadataError::DuplicateRouteName { .. })
    ));
}

#[test]
fn test_invalid_consumer_media_range_is_rejected() {
    struct BadRange;
    impl Describe for BadRange {
        fn describe() -> HandlerDescription {
            HandlerDescription::new()
                .route(RouteDescriptor::new("/bad"))
                .consumes(ConsumerDescriptor::new("not a media range", "json"))
                .operation(Operation::post(
                    "create",
                    |_: &BadRange, _req: &mut Request| Ok(Value::Null),
                ))
        }
    }

    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("bad-range", Arc::new(BadRange));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    assert!(matches!(
        store.metadata("bad-range"),
        Err(MetadataError::InvalidMediaRange { .. })
    ));
}

#[test]
fn test_load_failure_discards_all_cached_metadata() {
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    registry.register_instance("bad", Arc::new(NoRoutes));
    let (store, counting) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    store.metadata("alpha").expect("alpha loads");
    assert_eq!(counting.describes.load(Ordering::SeqCst), 1);

    // Loading a broken handler wipes alpha from the cache too.
    assert!(store.metadata("bad").is_err());

    store.metadata("alpha").expect("alpha reloads");
    // A second describe proves the earlier entry was not reused.
    assert_eq!(counting.describes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_execute_runs_bound_operation() {
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    let mut request = Request::new(Method::GET, "/alpha");
    let result = store
        .execute("alpha", &Method::GET, &Alpha, &mut request)
        .expect("execute");
    assert_eq!(result, json!({"handler": "alpha"}));
}

#[test]
fn test_execute_rejects_wrong_instance_type() {
    struct Impostor;

    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    let mut request = Request::new(Method::GET, "/alpha");
    match store.execute("alpha", &Method::GET, &Impostor, &mut request) {
        Err(ExecuteError::Metadata(MetadataError::InvalidHandlerObject { .. })) => {}
        other => panic!("expected InvalidHandlerObject, got {other:?}"),
    }
}

#[test]
fn test_execute_without_operation_for_method() {
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    let (store, _) = store_with(registry, Arc::new(MemoryCacheStore::new()));

    let mut request = Request::new(Method::DELETE, "/alpha");
    assert!(matches!(
        store.execute("alpha", &Method::DELETE, &Alpha, &mut request),
        Err(ExecuteError::Metadata(MetadataError::NoSuchOperation { .. }))
    ));
}

#[test]
fn test_flush_and_restore_skips_validation() {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());

    {
        let mut registry = crate::registry::HandlerRegistry::new();
        registry.register_instance("alpha", Arc::new(Alpha));
        let (store, _) = store_with(registry, Arc::clone(&cache));
        store.metadata("alpha").expect("load");
        store.flush();
    }

    // Fresh store over the same cache: descriptors come from the blob, so
    // queries touch neither the resolver nor the source.
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    let (store, counting) = store_with(registry, Arc::clone(&cache));

    let methods = store.http_methods("alpha").expect("methods");
    assert_eq!(methods, vec![Method::GET]);
    let meta = store.metadata("alpha").expect("metadata");
    assert_eq!(meta.operation_name(&Method::GET), Some("read"));
    let consumers = store.consumers("alpha", &Method::GET).expect("consumers");
    assert!(consumers[0].matches("application/json; charset=utf-8"));
    assert_eq!(counting.describes.load(Ordering::SeqCst), 0);
    assert_eq!(counting.resolves.load(Ordering::SeqCst), 0);

    // Execution binds invokers lazily, exactly once.
    let mut request = Request::new(Method::GET, "/alpha");
    let result = store
        .execute("alpha", &Method::GET, &Alpha, &mut request)
        .expect("execute");
    assert_eq!(result, json!({"handler": "alpha"}));
    assert_eq!(counting.describes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_flush_is_a_no_op_when_clean() {
    struct SilentCache {
        writes: AtomicUsize,
    }
    impl CacheStore for SilentCache {
        fn get(&self, _key: &str) -> Option<Vec<u8>> {
            None
        }
        fn set(&self, _key: &str, _value: &[u8]) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    let cache = Arc::new(SilentCache {
        writes: AtomicUsize::new(0),
    });
    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    let (store, _) = store_with(registry, Arc::clone(&cache) as Arc<dyn CacheStore>);

    store.flush();
    assert_eq!(cache.writes.load(Ordering::SeqCst), 0);

    store.metadata("alpha").expect("load");
    store.flush();
    assert_eq!(cache.writes.load(Ordering::SeqCst), 1);

    // Already flushed; nothing new to write.
    store.flush();
    assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_corrupt_blob_starts_empty() {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    cache.set(METADATA_CACHE_KEY, b"not json at all");

    let mut registry = crate::registry::HandlerRegistry::new();
    registry.register_instance("alpha", Arc::new(Alpha));
    let (store, counting) = store_with(registry, cache);

    store.metadata("alpha").expect("load despite corrupt blob");
    assert_eq!(counting.describes.load(Ordering::SeqCst), 1);
}
