//! Resolve `(path, method)` against the registered patterns.
//!
//! Backed by a matchit radix router keyed by pattern, with a
//! per-pattern method table on the side. matchit's precedence (static
//! segments over parameters, deterministic order among peers) is
//! exactly the specificity rule the framework promises: more literal
//! segments win, fewer parameters win, then pattern order.

use std::collections::HashMap;

use http::Method;

use super::{Route, RouteMethod};
use crate::context::PathParams;
use crate::error::Error;

/// The outcome of a lookup.
#[derive(Debug)]
pub enum RouteMatch {
    Matched(Matched),
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

pub struct Matched {
    /// The registered pattern that matched, e.g. `/users/:id`.
    pub path: String,
    pub method: RouteMethod,
    pub params: PathParams,
}

impl std::fmt::Debug for Matched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matched")
            .field("path", &self.path)
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Default)]
pub struct Matcher {
    router: matchit::Router<String>,
    tables: HashMap<String, HashMap<Method, RouteMethod>>,
}

/// `/users/:id` → `/users/{id}` (matchit capture syntax).
fn to_matchit(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from the registry's current route set.
    pub fn from_routes(routes: &[Route]) -> Result<Self, Error> {
        let mut matcher = Self::new();
        for route in routes {
            for (method, route_method) in &route.methods {
                matcher.add(&route.path, method.clone(), route_method.clone())?;
            }
        }
        Ok(matcher)
    }

    pub fn add(&mut self, path: &str, method: Method, route_method: RouteMethod) -> Result<(), Error> {
        if !self.tables.contains_key(path) {
            self.router
                .insert(to_matchit(path), path.to_string())
                .map_err(|e| Error::Internal {
                    title: format!("route pattern '{path}' cannot be indexed"),
                    details: None,
                    original_message: Some(e.to_string()),
                })?;
        }
        self.tables
            .entry(path.to_string())
            .or_default()
            .insert(method, route_method);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) {
        if self.tables.remove(path).is_some() {
            let _ = self.router.remove(to_matchit(path));
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn match_route(&self, path: &str, method: &Method) -> RouteMatch {
        let Ok(hit) = self.router.at(path) else {
            return RouteMatch::NotFound;
        };
        let pattern = hit.value;
        let Some(table) = self.tables.get(pattern) else {
            return RouteMatch::NotFound;
        };

        match table.get(method) {
            Some(route_method) => {
                let params: PathParams = hit
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                RouteMatch::Matched(Matched {
                    path: pattern.clone(),
                    method: route_method.clone(),
                    params,
                })
            }
            None => {
                let mut allowed: Vec<Method> = table.keys().cloned().collect();
                allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                RouteMatch::MethodNotAllowed { allowed }
            }
        }
    }
}
