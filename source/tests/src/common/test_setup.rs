//! Shared fixtures: a line-format route loader, a recording event
//! sink, and a poll-until helper for watcher scenarios.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use serde_json::json;
use tokio::time::timeout;

use strada::error::{Error, LoadError};
use strada::router::watcher::RouteEvents;
use strada::{handler_fn, Route, RouteLoader, RouteMethod};

/// Loads route modules in a one-route-per-line format:
/// `GET /users`. The line itself doubles as the handler tag, so any
/// edit to a line is a content change. Files containing `poison`
/// fail to load.
pub struct ManifestLoader {
    pub loads: AtomicUsize,
}

impl ManifestLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RouteLoader for ManifestLoader {
    async fn load(&self, file: &Path, _routes_dir: &Path) -> Result<Vec<Route>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let text = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| LoadError::new(file, e.to_string()))?;
        if text.contains("poison") {
            return Err(LoadError::new(file, "poisoned module"));
        }

        let mut routes: Vec<Route> = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (method, path) = line.split_once(' ').unwrap_or(("GET", line));
            let method: Method = method.parse().unwrap_or(Method::GET);
            let route_path = path.to_string();
            let handler = handler_fn(move |_ctx, params| {
                let route_path = route_path.clone();
                Box::pin(async move {
                    Ok(Some(json!({"route": route_path, "params": params})))
                })
            });
            let rm = RouteMethod::new(handler).with_tag(line.to_string());
            match routes.iter_mut().find(|r| r.path == path) {
                Some(route) => {
                    route.methods.insert(method, rm);
                }
                None => routes.push(Route::new(path).method(method, rm)),
            }
        }
        Ok(routes)
    }

    fn extensions(&self) -> &[&str] {
        &["routes"]
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub added: Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub changed: Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub removed: Mutex<Vec<(PathBuf, Vec<String>)>>,
    pub errors: Mutex<Vec<String>>,
}

fn paths_of(routes: &[Route]) -> Vec<String> {
    routes.iter().map(|r| r.path.clone()).collect()
}

impl RouteEvents for RecordingEvents {
    fn on_routes_added(&self, file: &Path, routes: &[Route]) {
        self.added
            .lock()
            .unwrap()
            .push((file.to_path_buf(), paths_of(routes)));
    }

    fn on_routes_changed(&self, file: &Path, routes: &[Route]) {
        self.changed
            .lock()
            .unwrap()
            .push((file.to_path_buf(), paths_of(routes)));
    }

    fn on_routes_removed(&self, file: &Path, routes: &[Route]) {
        self.removed
            .lock()
            .unwrap()
            .push((file.to_path_buf(), paths_of(routes)));
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

impl RecordingEvents {
    pub fn added_count(&self) -> usize {
        self.added.lock().unwrap().len()
    }

    pub fn changed_count(&self) -> usize {
        self.changed.lock().unwrap().len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.lock().unwrap().len()
    }
}

/// Poll `condition` until it holds, panicking with `what` after five
/// seconds.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let poll = async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    if timeout(Duration::from_secs(5), poll).await.is_err() {
        panic!("timeout waiting for: {what}");
    }
}
