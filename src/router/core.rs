use super::parse::{parse_pattern, PatternError, Segment};
use crate::cache::CacheStore;
use crate::metadata::{MetadataError, MetadataStore};
use crate::request::Request;
use crate::HANDLER_ATTRIBUTE;
use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Fixed key under which the table persists its compiled dispatch data.
pub const ROUTES_CACHE_KEY: &str = "waymark.routes";

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Globally unique route name.
    pub name: String,
    /// Path pattern as registered.
    pub pattern: String,
    /// HTTP methods this route accepts; empty accepts any method.
    pub methods: Vec<Method>,
    /// Defaults merged into matched parameters; captures override.
    pub defaults: Map<String, Value>,
    /// Higher priority routes are tried first.
    pub priority: i32,
}

/// A successful path match.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route.
    pub route: Arc<Route>,
    /// Route defaults overlaid with captured path variables.
    pub params: HashMap<String, Value>,
}

/// Result of matching a method and path against the table.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// A route matched and allows the method.
    Found(RouteMatch),
    /// At least one route matched the path, none allow the method.
    MethodNotAllowed {
        /// Union of methods the path-matching routes accept.
        allowed: Vec<Method>,
    },
    /// No route matched the path.
    NotFound,
}

/// Errors raised by route registration, matching, and URI generation.
#[derive(Debug)]
pub enum RouteTableError {
    /// A route with this name is already registered.
    DuplicateRouteName {
        /// The colliding name.
        name: String,
    },
    /// The pattern does not parse.
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parse failure detail.
        source: PatternError,
    },
    /// A variable mask is not a valid regex.
    InvalidMask {
        /// Route name.
        route: String,
        /// Mask source text.
        mask: String,
        /// Regex compile failure.
        source: regex::Error,
    },
    /// `generate_uri` was called for a name that was never registered.
    UnknownRoute {
        /// The unknown name.
        name: String,
    },
    /// No pattern variant could be fully substituted.
    IncompleteSubstitution {
        /// Route name.
        route: String,
        /// A variable that had no usable value.
        variable: String,
    },
    /// A supplied value failed its variable's mask.
    MaskMismatch {
        /// Route name.
        route: String,
        /// Variable name.
        variable: String,
        /// The rejected value.
        value: String,
    },
    /// Failure reading handler metadata while mounting.
    Metadata(MetadataError),
}

impl fmt::Display for RouteTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTableError::DuplicateRouteName { name } => {
                write!(f, "route name '{name}' is already registered")
            }
            RouteTableError::InvalidPattern { pattern, source } => {
                write!(f, "invalid route pattern '{pattern}': {source}")
            }
            RouteTableError::InvalidMask {
                route,
                mask,
                source,
            } => {
                write!(f, "route '{route}' has invalid mask '{mask}': {source}")
            }
            RouteTableError::UnknownRoute { name } => {
                write!(f, "no route registered under '{name}'")
            }
            RouteTableError::IncompleteSubstitution { route, variable } => {
                write!(
                    f,
                    "cannot generate URI for route '{route}': no value for '{variable}'"
                )
            }
            RouteTableError::MaskMismatch {
                route,
                variable,
                value,
            } => {
                write!(
                    f,
                    "value '{value}' for '{variable}' fails the mask of route '{route}'"
                )
            }
            RouteTableError::Metadata(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RouteTableError {}

impl From<MetadataError> for RouteTableError {
    fn from(err: MetadataError) -> Self {
        RouteTableError::Metadata(err)
    }
}

/// One compiled matcher: a regex for a single pattern variant of a route.
struct Matcher {
    regex: Regex,
    var_names: Vec<String>,
    route_name: String,
}

/// Compiled dispatch data derived from the registered routes.
///
/// Valid while it was built from a superset of the currently registered
/// routes; the name set records what it covers.
struct CompiledRoutes {
    matchers: Vec<Matcher>,
    variants: HashMap<String, Vec<Vec<Segment>>>,
    route_names: HashSet<String>,
}

impl CompiledRoutes {
    fn covers<'a>(&self, mut names: impl Iterator<Item = &'a String>) -> bool {
        names.all(|name| self.route_names.contains(name))
    }
}

/// Serialized compiled data: regexes travel as source strings and are
/// recompiled on restore.
#[derive(Serialize, Deserialize)]
struct PersistedCompiled {
    matchers: Vec<PersistedMatcher>,
    variants: HashMap<String, Vec<Vec<Segment>>>,
    route_names: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct PersistedMatcher {
    regex: String,
    var_names: Vec<String>,
    route_name: String,
}

impl PersistedCompiled {
    fn from_runtime(compiled: &CompiledRoutes) -> Self {
        Self {
            matchers: compiled
                .matchers
                .iter()
                .map(|m| PersistedMatcher {
                    regex: m.regex.as_str().to_string(),
                    var_names: m.var_names.clone(),
                    route_name: m.route_name.clone(),
                })
                .collect(),
            variants: compiled.variants.clone(),
            route_names: compiled.route_names.iter().cloned().collect(),
        }
    }

    fn into_runtime(self) -> Option<CompiledRoutes> {
        let matchers = self
            .matchers
            .into_iter()
            .map(|m| {
                Regex::new(&m.regex).ok().map(|regex| Matcher {
                    regex,
                    var_names: m.var_names,
                    route_name: m.route_name,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(CompiledRoutes {
            matchers,
            variants: self.variants,
            route_names: self.route_names.into_iter().collect(),
        })
    }
}

struct TableState {
    /// Routes in registration order; matching order also weighs priority.
    routes: Vec<Arc<Route>>,
    by_name: HashMap<String, usize>,
    compiled: Option<Arc<CompiledRoutes>>,
}

/// List-based path matcher with cached compiled dispatch data.
///
/// Routes are registered up front (directly or by mounting handler metadata);
/// the dispatchable form — anchored regexes ordered by priority — is built
/// lazily from the full registered set and cached through the cache
/// collaborator. The compiled artifact is regenerated whenever a registered
/// route is not covered by it.
pub struct RouteTable {
    cache: Arc<dyn CacheStore>,
    persist: bool,
    state: RwLock<TableState>,
}

impl RouteTable {
    /// Create a table backed by the given cache collaborator.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self::with_persistence(cache, true)
    }

    /// Create a table honoring the environment-driven cache configuration.
    #[must_use]
    pub fn with_config(cache: Arc<dyn CacheStore>, config: &crate::config::CacheConfig) -> Self {
        Self::with_persistence(cache, config.persist_routes)
    }

    /// Create a table with compiled-data persistence switched on or off.
    #[must_use]
    pub fn with_persistence(cache: Arc<dyn CacheStore>, persist: bool) -> Self {
        Self {
            cache,
            persist,
            state: RwLock::new(TableState {
                routes: Vec::new(),
                by_name: HashMap::new(),
                compiled: None,
            }),
        }
    }

    /// Register a route.
    ///
    /// # Errors
    ///
    /// `DuplicateRouteName` when the name is taken (the existing route stays
    /// registered and matchable), `InvalidPattern` when the pattern does not
    /// parse.
    pub fn register(&self, route: Route) -> Result<(), RouteTableError> {
        // Validate the pattern up front so registration, not the first
        // match, reports syntax errors.
        parse_pattern(&route.pattern).map_err(|source| RouteTableError::InvalidPattern {
            pattern: route.pattern.clone(),
            source,
        })?;
        let mut state = self.state.write().expect("route table lock poisoned");
        if state.by_name.contains_key(&route.name) {
            return Err(RouteTableError::DuplicateRouteName {
                name: route.name.clone(),
            });
        }
        debug!(route = %route.name, pattern = %route.pattern, "route registered");
        let index = state.routes.len();
        state.by_name.insert(route.name.clone(), index);
        state.routes.push(Arc::new(route));
        Ok(())
    }

    /// Register a route from its parts; the name defaults to the pattern.
    pub fn add_route(
        &self,
        pattern: &str,
        methods: Vec<Method>,
        name: Option<&str>,
        defaults: Map<String, Value>,
    ) -> Result<(), RouteTableError> {
        self.register(Route {
            name: name.unwrap_or(pattern).to_string(),
            pattern: pattern.to_string(),
            methods,
            defaults,
            priority: 0,
        })
    }

    /// Register every route a handler declares.
    ///
    /// Route names are prefixed with the handler name for global uniqueness,
    /// and the handler name is recorded in the route defaults under
    /// [`HANDLER_ATTRIBUTE`] so a match carries it into the request.
    pub fn mount(&self, handler_name: &str, store: &MetadataStore) -> Result<(), RouteTableError> {
        let methods = store.http_methods(handler_name)?;
        for descriptor in store.routes(handler_name)? {
            let mut defaults = descriptor.defaults.clone();
            defaults.insert(
                HANDLER_ATTRIBUTE.to_string(),
                Value::String(handler_name.to_string()),
            );
            self.register(Route {
                name: format!("{handler_name}.{}", descriptor.effective_name()),
                pattern: descriptor.pattern,
                methods: methods.clone(),
                defaults,
                priority: descriptor.priority,
            })?;
        }
        Ok(())
    }

    /// Match a method and path against the registered routes.
    pub fn match_request(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<MatchOutcome, RouteTableError> {
        let compiled = self.ascertain_routing_data()?;
        let state = self.state.read().expect("route table lock poisoned");
        let mut allowed: Vec<Method> = Vec::new();
        let mut path_matched = false;

        for matcher in &compiled.matchers {
            let Some(captures) = matcher.regex.captures(path) else {
                continue;
            };
            // The compiled artifact may cover routes from an earlier process
            // generation; only currently registered routes can match.
            let Some(route) = state
                .by_name
                .get(&matcher.route_name)
                .map(|&index| &state.routes[index])
            else {
                continue;
            };
            if route.methods.is_empty() || route.methods.contains(method) {
                let mut params: HashMap<String, Value> = route
                    .defaults
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for var in &matcher.var_names {
                    if let Some(capture) = captures.name(var) {
                        params.insert(var.clone(), Value::String(capture.as_str().to_string()));
                    }
                }
                debug!(
                    method = %method,
                    path = %path,
                    route = %route.name,
                    "route matched"
                );
                return Ok(MatchOutcome::Found(RouteMatch {
                    route: Arc::clone(route),
                    params,
                }));
            }
            path_matched = true;
            for m in &route.methods {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if path_matched {
            debug!(method = %method, path = %path, allowed = ?allowed, "method not allowed");
            Ok(MatchOutcome::MethodNotAllowed { allowed })
        } else {
            debug!(method = %method, path = %path, "no route matched");
            Ok(MatchOutcome::NotFound)
        }
    }

    /// Match a request and, on success, copy the matched parameters (handler
    /// name included, via the route defaults) into its attribute bag.
    pub fn route_request(&self, request: &mut Request) -> Result<MatchOutcome, RouteTableError> {
        let outcome = self.match_request(&request.method, &request.path)?;
        if let MatchOutcome::Found(route_match) = &outcome {
            for (name, value) in &route_match.params {
                request.set_attribute(name.clone(), value.clone());
            }
        }
        Ok(outcome)
    }

    /// Generate a URI for a named route.
    ///
    /// Variants are tried from most specific (all optional segments present)
    /// to least; the first variant whose every variable has a non-empty value
    /// passing its mask wins. Values are looked up in `substitutions`, then
    /// `extra_defaults`, then the route's own defaults.
    pub fn generate_uri(
        &self,
        name: &str,
        substitutions: &HashMap<String, Value>,
        extra_defaults: &HashMap<String, Value>,
    ) -> Result<String, RouteTableError> {
        let route = {
            let state = self.state.read().expect("route table lock poisoned");
            state
                .by_name
                .get(name)
                .map(|&index| Arc::clone(&state.routes[index]))
                .ok_or_else(|| RouteTableError::UnknownRoute {
                    name: name.to_string(),
                })?
        };
        let compiled = self.ascertain_routing_data()?;
        let variants = compiled
            .variants
            .get(name)
            .ok_or_else(|| RouteTableError::UnknownRoute {
                name: name.to_string(),
            })?;

        let lookup = |var: &str| -> Option<String> {
            substitutions
                .get(var)
                .or_else(|| extra_defaults.get(var))
                .or_else(|| route.defaults.get(var))
                .and_then(value_to_string)
                .filter(|v| !v.is_empty())
        };

        let mut missing = String::new();
        'variants: for variant in variants.iter().rev() {
            let mut path = String::new();
            for segment in variant {
                match segment {
                    Segment::Literal(literal) => path.push_str(literal),
                    Segment::Variable { name: var, mask } => {
                        let Some(value) = lookup(var) else {
                            missing = var.clone();
                            continue 'variants;
                        };
                        if let Some(mask) = mask {
                            let anchored = format!("^(?:{mask})$");
                            let regex = Regex::new(&anchored).map_err(|source| {
                                RouteTableError::InvalidMask {
                                    route: name.to_string(),
                                    mask: mask.clone(),
                                    source,
                                }
                            })?;
                            if !regex.is_match(&value) {
                                return Err(RouteTableError::MaskMismatch {
                                    route: name.to_string(),
                                    variable: var.clone(),
                                    value,
                                });
                            }
                        }
                        path.push_str(&value);
                    }
                }
            }
            return Ok(path);
        }
        Err(RouteTableError::IncompleteSubstitution {
            route: name.to_string(),
            variable: missing,
        })
    }

    /// The compiled dispatch data, built or restored on demand.
    ///
    /// The cached artifact (in memory or from the cache collaborator) is used
    /// only while it covers every registered route; otherwise it is rebuilt
    /// from the current set and re-persisted.
    fn ascertain_routing_data(&self) -> Result<Arc<CompiledRoutes>, RouteTableError> {
        {
            let state = self.state.read().expect("route table lock poisoned");
            if let Some(compiled) = &state.compiled {
                if compiled.covers(state.by_name.keys()) {
                    return Ok(Arc::clone(compiled));
                }
            }
        }

        let mut state = self.state.write().expect("route table lock poisoned");
        if let Some(compiled) = &state.compiled {
            if compiled.covers(state.by_name.keys()) {
                return Ok(Arc::clone(compiled));
            }
        }

        if state.compiled.is_none() && self.persist {
            if let Some(restored) = self.restore() {
                if restored.covers(state.by_name.keys()) {
                    info!(
                        matchers = restored.matchers.len(),
                        "restored compiled routing data"
                    );
                    let restored = Arc::new(restored);
                    state.compiled = Some(Arc::clone(&restored));
                    return Ok(restored);
                }
            }
        }

        let compiled = Self::compile(&state.routes)?;
        info!(
            routes = state.routes.len(),
            matchers = compiled.matchers.len(),
            "routing table compiled"
        );
        if self.persist {
            match serde_json::to_vec(&PersistedCompiled::from_runtime(&compiled)) {
                Ok(bytes) => self.cache.set(ROUTES_CACHE_KEY, &bytes),
                Err(error) => warn!(%error, "failed to encode compiled routing data"),
            }
        }
        let compiled = Arc::new(compiled);
        state.compiled = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    fn restore(&self) -> Option<CompiledRoutes> {
        let bytes = self.cache.get(ROUTES_CACHE_KEY)?;
        let restored = serde_json::from_slice::<PersistedCompiled>(&bytes)
            .ok()
            .and_then(PersistedCompiled::into_runtime);
        if restored.is_none() {
            warn!("persisted routing data is unreadable, recompiling");
        }
        restored
    }

    /// Build matchers from all registered routes, ordered by descending
    /// priority with registration order as the tie-break; within one route,
    /// more specific variants are tried first.
    fn compile(routes: &[Arc<Route>]) -> Result<CompiledRoutes, RouteTableError> {
        let mut order: Vec<&Arc<Route>> = routes.iter().collect();
        order.sort_by_key(|route| std::cmp::Reverse(route.priority));

        let mut matchers = Vec::new();
        let mut variants = HashMap::new();
        let mut route_names = HashSet::new();
        for route in order {
            let parsed =
                parse_pattern(&route.pattern).map_err(|source| RouteTableError::InvalidPattern {
                    pattern: route.pattern.clone(),
                    source,
                })?;
            for variant in parsed.iter().rev() {
                let mut pattern = String::from("^");
                let mut var_names = Vec::new();
                for segment in variant {
                    match segment {
                        Segment::Literal(literal) => pattern.push_str(&regex::escape(literal)),
                        Segment::Variable { name, mask } => {
                            pattern.push_str("(?P<");
                            pattern.push_str(name);
                            pattern.push('>');
                            pattern.push_str(mask.as_deref().unwrap_or("[^/]+"));
                            pattern.push(')');
                            var_names.push(name.clone());
                        }
                    }
                }
                pattern.push('$');
                let regex =
                    Regex::new(&pattern).map_err(|source| RouteTableError::InvalidMask {
                        route: route.name.clone(),
                        mask: pattern.clone(),
                        source,
                    })?;
                matchers.push(Matcher {
                    regex,
                    var_names,
                    route_name: route.name.clone(),
                });
            }
            variants.insert(route.name.clone(), parsed);
            route_names.insert(route.name.clone());
        }
        Ok(CompiledRoutes {
            matchers,
            variants,
            route_names,
        })
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
