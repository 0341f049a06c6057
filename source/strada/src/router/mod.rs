//! Routing: discovery, registry, matcher, watcher, and the facade
//! tying them together.
//!
//! The registry owns the authoritative path → route mapping; the
//! matcher is an immutable snapshot rebuilt after every registry
//! mutation and swapped in atomically, so readers never block on
//! writers and never observe a half-applied update.

pub mod discovery;
pub mod fingerprint;
pub mod loader;
pub mod matcher;
pub mod registry;
pub mod watcher;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use http::Method;

use crate::error::Error;
use crate::pipeline::{Handler, Middleware};
use crate::validation::RouteSchema;

pub use matcher::{Matched, Matcher, RouteMatch};
pub use registry::{RouteConflict, RouteDelta, RouteRegistry};

/// One registered path pattern with its per-method bundles. A route's
/// identity is its final path, after any mount prefix was applied.
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub methods: HashMap<Method, RouteMethod>,
}

#[derive(Clone)]
pub struct RouteMethod {
    pub handler: Arc<dyn Handler>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub schema: Option<RouteSchema>,
    /// Loader-supplied token describing the handler's source form.
    /// Feeds the content fingerprint, nothing else.
    pub handler_tag: String,
}

impl RouteMethod {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            middleware: Vec::new(),
            schema: None,
            handler_tag: String::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.handler_tag = tag.into();
        self
    }

    pub fn with_middleware(mut self, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_schema(mut self, schema: RouteSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: HashMap::new(),
        }
    }

    pub fn method(mut self, method: Method, route_method: RouteMethod) -> Self {
        self.methods.insert(method, route_method);
        self
    }

    /// Apply a mount prefix. A prefix that does not start with `/` is
    /// ignored with a warning; the route keeps its original path.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if prefix.is_empty() {
            return self;
        }
        if !prefix.starts_with('/') {
            tracing::warn!(prefix, path = %self.path, "route prefix must start with '/', ignoring");
            return self;
        }

        let base = prefix.trim_end_matches('/');
        self.path = if self.path == "/" {
            if base.is_empty() {
                "/".to_string()
            } else {
                base.to_string()
            }
        } else {
            format!("{base}{}", self.path)
        };
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &methods)
            .finish()
    }
}

/// Registry + matcher snapshot behind one facade. All mutations go
/// through [`Router::apply`]; lookups read the current snapshot.
pub struct Router {
    registry: RouteRegistry,
    matcher: ArcSwap<Matcher>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            registry: RouteRegistry::default(),
            matcher: ArcSwap::from_pointee(Matcher::default()),
        }
    }

    /// Replace the routes owned by `source` and republish the matcher
    /// snapshot. The new snapshot is visible to every lookup after
    /// this returns.
    pub fn apply(&self, source: &str, routes: Vec<Route>) -> Result<RouteDelta, Error> {
        let delta = self.registry.update_from_source(source, routes)?;
        if !delta.is_empty() {
            self.rebuild()?;
        }
        Ok(delta)
    }

    fn rebuild(&self) -> Result<(), Error> {
        match Matcher::from_routes(&self.registry.get_all()) {
            Ok(matcher) => {
                self.matcher.store(Arc::new(matcher));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "matcher rebuild failed, keeping previous snapshot");
                Err(err)
            }
        }
    }

    pub fn lookup(&self, path: &str, method: &Method) -> RouteMatch {
        self.matcher.load().match_route(path, method)
    }

    pub fn routes(&self) -> Vec<Route> {
        self.registry.get_all()
    }

    pub fn conflicts(&self) -> Vec<RouteConflict> {
        self.registry.conflicts()
    }
}
