//! Route discovery: walk a directory tree, filter candidate files,
//! load them as route modules with bounded concurrency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_recursion::async_recursion;
use futures_util::{stream, StreamExt};
use tokio::fs;

use super::loader::RouteLoader;
use super::Route;
use crate::error::{DirectoryError, LoadError};

/// Suffixes that mark editor droppings, source maps and other files
/// that are never route modules, whatever their extension says.
const BACKUP_SUFFIXES: &[&str] = &["~", ".swp", ".swo", ".bak", ".tmp", ".orig", ".map"];

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Directory names pruned from the walk, on top of hidden ones.
    pub ignore_dirs: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            ignore_dirs: vec!["node_modules".to_string(), ".git".to_string()],
        }
    }
}

/// Whether `path` names a valid route module for `extensions`.
pub fn is_route_candidate(path: &Path, extensions: &[&str]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    if name.starts_with('_') || name.starts_with('.') {
        return false;
    }
    if name.starts_with('#') && name.ends_with('#') {
        return false;
    }
    if BACKUP_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return false;
    }
    if name.ends_with(".d.ts") || name.ends_with(".d.mts") || name.ends_with(".d.cts") {
        return false;
    }
    if name.contains(".test.") || name.contains(".spec.") {
        return false;
    }

    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if !extensions.contains(&ext) {
        return false;
    }

    // index.* files organize directories, they do not declare routes.
    name.split('.').next() != Some("index")
}

pub(crate) fn is_ignored_dir(name: &str, options: &DiscoveryOptions) -> bool {
    name.starts_with('.') || options.ignore_dirs.iter().any(|d| d == name)
}

/// All route-candidate files under `dir`, sorted. Fails only when the
/// top level is missing or not a directory; unreadable subdirectories
/// are logged and skipped.
pub async fn discover_route_files(
    dir: &Path,
    extensions: &[&str],
    options: &DiscoveryOptions,
) -> Result<Vec<PathBuf>, DirectoryError> {
    let meta = fs::metadata(dir)
        .await
        .map_err(|_| DirectoryError::NotFound(dir.to_path_buf()))?;
    if !meta.is_dir() {
        return Err(DirectoryError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(dir, extensions, options, &mut files).await;
    files.sort();
    Ok(files)
}

#[async_recursion]
async fn walk(dir: &Path, extensions: &[&str], options: &DiscoveryOptions, out: &mut Vec<PathBuf>) {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_dir() {
            let name = entry.file_name();
            if !is_ignored_dir(&name.to_string_lossy(), options) {
                walk(&path, extensions, options, out).await;
            }
        } else if is_route_candidate(&path, extensions) {
            out.push(path);
        }
    }
}

pub struct LoadedFile {
    pub path: PathBuf,
    pub routes: Vec<Route>,
}

/// The result of loading a whole directory: per-file route sets plus
/// the failures that did not abort the batch.
#[derive(Default)]
pub struct DirectoryLoad {
    pub files: Vec<LoadedFile>,
    pub failures: Vec<LoadError>,
}

impl DirectoryLoad {
    pub fn all_routes(&self) -> Vec<Route> {
        self.files.iter().flat_map(|f| f.routes.clone()).collect()
    }
}

/// Discover and load every route module under `dir`. Files load with
/// bounded concurrency (one slot per CPU); a failing file emits a
/// [`LoadError`] into the result and the batch continues.
pub async fn load_directory(
    dir: &Path,
    loader: &Arc<dyn RouteLoader>,
    options: &DiscoveryOptions,
) -> Result<DirectoryLoad, DirectoryError> {
    let files = discover_route_files(dir, loader.extensions(), options).await?;
    let width = std::cmp::max(1, num_cpus::get());

    let results: Vec<(PathBuf, Result<Vec<Route>, LoadError>)> = stream::iter(files)
        .map(|file| {
            let loader = loader.clone();
            let dir = dir.to_path_buf();
            async move {
                let result = loader.load(&file, &dir).await;
                (file, result)
            }
        })
        .buffered(width)
        .collect()
        .await;

    let mut load = DirectoryLoad::default();
    for (file, result) in results {
        match result {
            Ok(routes) => load.files.push(LoadedFile { path: file, routes }),
            Err(err) => {
                tracing::warn!(error = %err, "route module failed to load");
                load.failures.push(err);
            }
        }
    }
    Ok(load)
}
