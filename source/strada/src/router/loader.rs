//! The loader contract: how route modules on disk become [`Route`]
//! values is the host's business, not ours.

use std::path::Path;

use async_trait::async_trait;

use super::Route;
use crate::error::LoadError;

/// Materializes route modules. Implementations must be deterministic
/// for a given file content and must not serve stale results across
/// content changes; [`RouteWatcher`](super::watcher::RouteWatcher)
/// calls [`invalidate`](RouteLoader::invalidate) before every load to
/// make that explicit.
#[async_trait]
pub trait RouteLoader: Send + Sync {
    /// Load the routes defined by `file`. An empty vec is a valid
    /// result (the module defines no routes).
    async fn load(&self, file: &Path, routes_dir: &Path) -> Result<Vec<Route>, LoadError>;

    /// Drop any cached module state for `file`. Returns false when
    /// the host has a module cache it cannot invalidate; the watcher
    /// logs that once per file and proceeds with a possibly stale
    /// load. Hosts without a cache return true (every load is fresh).
    fn invalidate(&self, _file: &Path) -> bool {
        true
    }

    /// Module-file extensions this loader recognizes, without dots.
    fn extensions(&self) -> &[&str];
}

/// The registry source key for a route file.
pub fn source_key(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}
