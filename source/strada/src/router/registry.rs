//! The authoritative route store with per-source ownership.
//!
//! Three maps live under one lock: path → route, source → owned
//! paths, path → owning source. The single mutator is
//! [`update_from_source`](RouteRegistry::update_from_source); readers
//! get consistent snapshots and can never observe a half-applied
//! update.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use super::fingerprint::route_fingerprint;
use super::Route;
use crate::error::Error;

#[derive(Default)]
pub struct RouteRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    routes_by_path: BTreeMap<String, Route>,
    routes_by_file: HashMap<String, BTreeSet<String>>,
    path_to_file: HashMap<String, String>,
}

/// The precise effect of one `update_from_source` call. Paths within
/// each bucket appear in lexicographic order.
#[derive(Debug, Default)]
pub struct RouteDelta {
    pub added: Vec<Route>,
    pub changed: Vec<Route>,
    pub removed: Vec<Route>,
}

impl RouteDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteConflict {
    pub path: String,
    pub sources: Vec<String>,
}

impl RouteRegistry {
    /// Atomically replace the set of paths owned by `source`.
    ///
    /// If any incoming path is owned by a different source the call
    /// fails with [`Error::Conflict`] and mutates nothing. Removals
    /// are applied before additions; both proceed in lexicographic
    /// path order. Routes whose content fingerprint is unchanged are
    /// elided from the delta.
    pub fn update_from_source(
        &self,
        source: &str,
        new_routes: Vec<Route>,
    ) -> Result<RouteDelta, Error> {
        let mut inner = self.inner.lock().expect("route registry lock poisoned");

        // Within one update the last declaration of a path wins.
        let mut incoming: BTreeMap<String, Route> = BTreeMap::new();
        for route in new_routes {
            incoming.insert(route.path.clone(), route);
        }

        // Conflict check happens before any mutation.
        for path in incoming.keys() {
            if let Some(owner) = inner.path_to_file.get(path) {
                if owner != source {
                    return Err(Error::Conflict {
                        path: path.clone(),
                        existing_source: owner.clone(),
                        incoming_source: source.to_string(),
                    });
                }
            }
        }

        let prev: BTreeSet<String> = inner
            .routes_by_file
            .get(source)
            .cloned()
            .unwrap_or_default();

        let mut delta = RouteDelta::default();

        for path in &prev {
            if !incoming.contains_key(path) {
                if let Some(route) = inner.routes_by_path.remove(path) {
                    delta.removed.push(route);
                }
                inner.path_to_file.remove(path);
            }
        }

        for (path, route) in &incoming {
            if prev.contains(path) {
                let content_changed = inner
                    .routes_by_path
                    .get(path)
                    .map(|old| route_fingerprint(old) != route_fingerprint(route))
                    .unwrap_or(true);
                if content_changed {
                    delta.changed.push(route.clone());
                }
            } else {
                delta.added.push(route.clone());
            }
            inner.routes_by_path.insert(path.clone(), route.clone());
            inner.path_to_file.insert(path.clone(), source.to_string());
        }

        let owned: BTreeSet<String> = incoming.keys().cloned().collect();
        if owned.is_empty() {
            inner.routes_by_file.remove(source);
        } else {
            inner.routes_by_file.insert(source.to_string(), owned);
        }

        Ok(delta)
    }

    /// Every registered route, sorted by path.
    pub fn get_all(&self) -> Vec<Route> {
        let inner = self.inner.lock().expect("route registry lock poisoned");
        inner.routes_by_path.values().cloned().collect()
    }

    pub fn routes_for(&self, source: &str) -> Vec<Route> {
        let inner = self.inner.lock().expect("route registry lock poisoned");
        inner
            .routes_by_file
            .get(source)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|p| inner.routes_by_path.get(p).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Paths claimed by more than one source. Empty whenever the
    /// single-owner invariant holds, which `update_from_source`
    /// enforces; this is the diagnostic that proves it.
    pub fn conflicts(&self) -> Vec<RouteConflict> {
        let inner = self.inner.lock().expect("route registry lock poisoned");
        let mut owners: BTreeMap<&String, Vec<&String>> = BTreeMap::new();
        for (source, paths) in &inner.routes_by_file {
            for path in paths {
                owners.entry(path).or_default().push(source);
            }
        }
        owners
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(path, mut sources)| {
                sources.sort_unstable();
                RouteConflict {
                    path: path.clone(),
                    sources: sources.into_iter().cloned().collect(),
                }
            })
            .collect()
    }
}
