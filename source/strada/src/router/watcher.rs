//! Live route reloading: file-system events in, registry deltas out.
//!
//! Every file gets its own debounce timer; a burst of change events
//! collapses into one load. Loaded content is fingerprinted and an
//! unchanged fingerprint emits nothing, so editors that rewrite files
//! without changing them stay silent. Loader failures keep the
//! previous routes; the next event for that file retries fresh.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};

use notify::{RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::discovery::{self, DiscoveryOptions};
use super::fingerprint::routes_fingerprint;
use super::loader::{source_key, RouteLoader};
use super::{Route, Router};
use crate::error::Error;

/// Event-bus contract for route lifecycle notifications. All methods
/// default to no-ops; hosts implement what they care about.
pub trait RouteEvents: Send + Sync {
    fn on_routes_added(&self, _file: &Path, _routes: &[Route]) {}
    fn on_routes_changed(&self, _file: &Path, _routes: &[Route]) {}
    fn on_routes_removed(&self, _file: &Path, _routes: &[Route]) {}
    fn on_error(&self, _error: &Error) {}
}

pub struct NoopEvents;

impl RouteEvents for NoopEvents {}

#[derive(Clone)]
pub struct WatchOptions {
    /// Per-file debounce delay.
    pub debounce: Duration,
    pub discovery: DiscoveryOptions,
    /// Mount prefix applied to every loaded route (plugin dirs).
    pub prefix: Option<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(16),
            discovery: DiscoveryOptions::default(),
            prefix: None,
        }
    }
}

#[derive(Clone)]
pub struct FileCacheEntry {
    pub routes: Vec<Route>,
    pub mtime: Option<SystemTime>,
    pub fingerprint: String,
}

#[derive(Clone, Copy)]
enum FsEventKind {
    Upsert,
    Remove,
}

pub struct RouteWatcher {
    shared: Arc<WatcherShared>,
    event_loop: JoinHandle<()>,
    os_watcher: StdMutex<Option<notify::RecommendedWatcher>>,
}

impl RouteWatcher {
    /// Load the directory once, then watch it for changes. A failed
    /// initial scan is reported and the watcher stays alive for
    /// future events.
    pub async fn start(
        dir: impl Into<PathBuf>,
        loader: Arc<dyn RouteLoader>,
        router: Arc<Router>,
        events: Arc<dyn RouteEvents>,
        options: WatchOptions,
    ) -> Result<Self, Error> {
        let dir = dir.into();
        let shared = Arc::new(WatcherShared {
            dir: dir.clone(),
            loader,
            router,
            events,
            options,
            cache: Mutex::new(HashMap::new()),
            pending: StdMutex::new(HashMap::new()),
            invalidate_warned: StdMutex::new(HashSet::new()),
        });

        shared.initial_load().await;

        let (tx, rx) = mpsc::channel::<(FsEventKind, PathBuf)>(256);
        let mut os_watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "file watcher error event");
                        return;
                    }
                };
                let kind = if event.kind.is_remove() {
                    FsEventKind::Remove
                } else if event.kind.is_create() || event.kind.is_modify() {
                    FsEventKind::Upsert
                } else {
                    return;
                };
                for path in event.paths {
                    let _ = tx.blocking_send((kind, path));
                }
            })
            .map_err(|e| Error::wrap("failed to create the file watcher", &e))?;

        os_watcher
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|e| Error::wrap("failed to watch the routes directory", &e))?;

        tracing::info!(dir = %dir.display(), "watching routes directory");

        let event_loop = tokio::spawn(WatcherShared::event_loop(shared.clone(), rx));

        Ok(Self {
            shared,
            event_loop,
            os_watcher: StdMutex::new(Some(os_watcher)),
        })
    }

    /// Every route currently known from watched files, flattened.
    pub async fn get_routes(&self) -> Vec<Route> {
        let cache = self.shared.cache.lock().await;
        cache.values().flat_map(|e| e.routes.clone()).collect()
    }

    /// Snapshot of the per-file route sets.
    pub async fn get_routes_by_file(&self) -> HashMap<PathBuf, Vec<Route>> {
        let cache = self.shared.cache.lock().await;
        cache
            .iter()
            .map(|(path, entry)| (path.clone(), entry.routes.clone()))
            .collect()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.shared.router
    }

    /// Drop pending debounce timers without processing them and close
    /// the underlying OS watch descriptors.
    pub fn close(&self) {
        let mut pending = self
            .shared
            .pending
            .lock()
            .expect("watcher pending lock poisoned");
        for (_, handle) in pending.drain() {
            handle.abort();
        }
        drop(pending);
        self.event_loop.abort();
        self.os_watcher
            .lock()
            .expect("watcher handle lock poisoned")
            .take();
    }
}

impl Drop for RouteWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

struct WatcherShared {
    dir: PathBuf,
    loader: Arc<dyn RouteLoader>,
    router: Arc<Router>,
    events: Arc<dyn RouteEvents>,
    options: WatchOptions,
    cache: Mutex<HashMap<PathBuf, FileCacheEntry>>,
    pending: StdMutex<HashMap<PathBuf, JoinHandle<()>>>,
    invalidate_warned: StdMutex<HashSet<PathBuf>>,
}

impl WatcherShared {
    async fn initial_load(&self) {
        let load = match discovery::load_directory(
            &self.dir,
            &self.loader,
            &self.options.discovery,
        )
        .await
        {
            Ok(load) => load,
            Err(e) => {
                let err = Error::Directory(e);
                tracing::warn!(error = %err, "initial route scan failed; waiting for file events");
                self.events.on_error(&err);
                return;
            }
        };

        for failure in load.failures {
            let err = Error::Load(failure);
            tracing::warn!(error = %err, "route module skipped during initial load");
            self.events.on_error(&err);
        }

        for file in load.files {
            let routes = self.prefixed(file.routes);
            let mtime = mtime_of(&file.path).await;
            let fingerprint = routes_fingerprint(&routes);
            match self.router.apply(&source_key(&file.path), routes.clone()) {
                Ok(_) => {
                    self.cache.lock().await.insert(
                        file.path,
                        FileCacheEntry {
                            routes,
                            mtime,
                            fingerprint,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, file = %file.path.display(), "route file rejected during initial load");
                    self.events.on_error(&err);
                }
            }
        }
    }

    async fn event_loop(shared: Arc<Self>, mut rx: mpsc::Receiver<(FsEventKind, PathBuf)>) {
        while let Some((kind, path)) = rx.recv().await {
            if shared.under_ignored_dir(&path) {
                continue;
            }
            if !discovery::is_route_candidate(&path, shared.loader.extensions()) {
                continue;
            }
            shared.schedule(kind, path);
        }
    }

    fn under_ignored_dir(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.dir).unwrap_or(path);
        relative.components().any(|c| match c {
            std::path::Component::Normal(name) => {
                // The file name itself is judged by the candidate
                // filter, not the directory ignore set.
                Some(name) != path.file_name()
                    && discovery::is_ignored_dir(
                        &name.to_string_lossy(),
                        &self.options.discovery,
                    )
            }
            _ => false,
        })
    }

    /// Arm (or re-arm) this file's debounce timer.
    fn schedule(self: &Arc<Self>, kind: FsEventKind, path: PathBuf) {
        let mut pending = self.pending.lock().expect("watcher pending lock poisoned");
        if let Some(previous) = pending.remove(&path) {
            previous.abort();
        }

        let shared = self.clone();
        let key = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(shared.options.debounce).await;
            shared
                .pending
                .lock()
                .expect("watcher pending lock poisoned")
                .remove(&key);
            shared.process(kind, &key).await;
        });
        pending.insert(path, handle);
    }

    async fn process(&self, kind: FsEventKind, path: &Path) {
        match kind {
            FsEventKind::Upsert => self.process_upsert(path).await,
            FsEventKind::Remove => self.process_remove(path).await,
        }
    }

    async fn process_upsert(&self, path: &Path) {
        let mtime = mtime_of(path).await;

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(path) {
                if entry.mtime.is_some() && entry.mtime == mtime {
                    // Same on-disk version we already hold.
                    return;
                }
            }
        }

        if !self.loader.invalidate(path) {
            let mut warned = self
                .invalidate_warned
                .lock()
                .expect("watcher warn-set lock poisoned");
            if warned.insert(path.to_path_buf()) {
                tracing::warn!(
                    file = %path.display(),
                    "module cache invalidation unavailable; reloads may return stale routes"
                );
            }
        }

        let routes = match self.loader.load(path, &self.dir).await {
            Ok(routes) => self.prefixed(routes),
            Err(err) => {
                let err = Error::Load(err);
                tracing::warn!(error = %err, "route reload failed, keeping previous routes");
                self.events.on_error(&err);
                return;
            }
        };

        let fingerprint = routes_fingerprint(&routes);
        let previous = {
            let cache = self.cache.lock().await;
            cache.get(path).map(|e| e.fingerprint.clone())
        };

        if previous.as_deref() == Some(fingerprint.as_str()) {
            // Content unchanged; remember the new mtime so the next
            // event short-circuits without a load.
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get_mut(path) {
                entry.mtime = mtime;
            }
            return;
        }

        match self.router.apply(&source_key(path), routes.clone()) {
            Ok(delta) => {
                tracing::info!(
                    file = %path.display(),
                    added = delta.added.len(),
                    changed = delta.changed.len(),
                    removed = delta.removed.len(),
                    "routes reloaded"
                );
                self.cache.lock().await.insert(
                    path.to_path_buf(),
                    FileCacheEntry {
                        routes: routes.clone(),
                        mtime,
                        fingerprint,
                    },
                );
                if previous.is_none() {
                    self.events.on_routes_added(path, &routes);
                } else {
                    self.events.on_routes_changed(path, &routes);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "registry rejected reloaded routes, keeping previous state");
                self.events.on_error(&err);
            }
        }
    }

    async fn process_remove(&self, path: &Path) {
        let Some(entry) = self.cache.lock().await.remove(path) else {
            return;
        };
        match self.router.apply(&source_key(path), vec![]) {
            Ok(_) => {
                tracing::info!(file = %path.display(), removed = entry.routes.len(), "route file removed");
                self.events.on_routes_removed(path, &entry.routes);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to unregister removed file");
                self.events.on_error(&err);
            }
        }
    }

    fn prefixed(&self, routes: Vec<Route>) -> Vec<Route> {
        match &self.options.prefix {
            Some(prefix) => routes
                .into_iter()
                .map(|r| r.with_prefix(prefix))
                .collect(),
            None => routes,
        }
    }
}

async fn mtime_of(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
