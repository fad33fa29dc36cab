//! Typed factory registries.
//!
//! The original's resolve-by-name plugin managers become typed registries: a
//! map from name to factory, with a resolve function that constructs the
//! instance in one step and surfaces a typed error instead of a null. One
//! generic [`Registry`] covers consumers, producers, and attributes; the
//! [`HandlerRegistry`] additionally serves as the default descriptor-reading
//! front-end for handlers that implement [`Describe`].

use crate::metadata::{Describe, DescriptorSource, Handler, HandlerDescription, HandlerResolver};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolution failure: nothing registered under the requested name.
///
/// Reaching this at dispatch time is a configuration bug — metadata refers to
/// a plugin that was never registered — and is surfaced as a fatal error, not
/// a 4xx response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryError {
    /// What kind of registry refused ("consumer", "producer", "attribute").
    pub kind: &'static str,
    /// The unresolvable name.
    pub name: String,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no {} registered under '{}'", self.kind, self.name)
    }
}

impl std::error::Error for RegistryError {}

type Factory<T> = Box<dyn Fn(Option<&Value>) -> Arc<T> + Send + Sync>;

/// Factory registry for one plugin kind.
pub struct Registry<T: ?Sized + Send + Sync> {
    kind: &'static str,
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized + Send + Sync> Registry<T> {
    /// Create an empty registry; `kind` labels resolution errors.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: HashMap::new(),
        }
    }

    /// Register a factory constructing instances from descriptor options.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Option<&Value>) -> Arc<T> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Register a shared instance, ignoring descriptor options.
    pub fn register_instance(&mut self, name: impl Into<String>, instance: Arc<T>)
    where
        T: 'static,
    {
        self.register(name, move |_| Arc::clone(&instance));
    }

    /// Construct the instance registered under `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError`] when nothing is registered under `name`.
    pub fn resolve(&self, name: &str, options: Option<&Value>) -> Result<Arc<T>, RegistryError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(options)),
            None => Err(RegistryError {
                kind: self.kind,
                name: name.to_string(),
            }),
        }
    }
}

struct HandlerEntry {
    factory: Box<dyn Fn() -> Arc<dyn Handler> + Send + Sync>,
    describe: Box<dyn Fn() -> HandlerDescription + Send + Sync>,
}

/// Registry of handler instances and their descriptions.
///
/// Implements both collaborator seams of the metadata store: instance
/// resolution and descriptor reading.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: HashMap<String, HandlerEntry>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler constructed per resolution.
    pub fn register<H, F>(&mut self, name: impl Into<String>, factory: F)
    where
        H: Handler + Describe,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            HandlerEntry {
                factory: Box::new(move || Arc::new(factory()) as Arc<dyn Handler>),
                describe: Box::new(H::describe),
            },
        );
    }

    /// Register a shared handler instance (the common case).
    pub fn register_instance<H>(&mut self, name: impl Into<String>, instance: Arc<H>)
    where
        H: Handler + Describe,
    {
        self.entries.insert(
            name.into(),
            HandlerEntry {
                factory: Box::new(move || Arc::clone(&instance) as Arc<dyn Handler>),
                describe: Box::new(H::describe),
            },
        );
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, name: &str) -> anyhow::Result<Arc<dyn Handler>> {
        match self.entries.get(name) {
            Some(entry) => Ok((entry.factory)()),
            None => anyhow::bail!("no handler registered under '{name}'"),
        }
    }
}

impl DescriptorSource for HandlerRegistry {
    fn describe(&self, name: &str) -> anyhow::Result<HandlerDescription> {
        match self.entries.get(name) {
            Some(entry) => Ok((entry.describe)()),
            None => anyhow::bail!("no handler registered under '{name}'"),
        }
    }
}
