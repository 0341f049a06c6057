#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use http::Method;

    use crate::common::{wait_until, ManifestLoader, RecordingEvents};
    use strada::router::watcher::WatchOptions;
    use strada::{RouteMatch, RouteWatcher, Router};

    fn write_sync(path: &Path, content: &str) {
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }

    async fn start_watcher(
        dir: &Path,
        loader: Arc<ManifestLoader>,
        events: Arc<RecordingEvents>,
    ) -> (Arc<Router>, RouteWatcher) {
        let router = Arc::new(Router::new());
        let watcher = RouteWatcher::start(
            dir,
            loader,
            router.clone(),
            events,
            WatchOptions {
                debounce: Duration::from_millis(50),
                ..WatchOptions::default()
            },
        )
        .await
        .unwrap();
        (router, watcher)
    }

    #[tokio::test]
    async fn test_add_then_change_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ManifestLoader::new();
        let events = Arc::new(RecordingEvents::default());
        let (router, watcher) = start_watcher(dir.path(), loader, events.clone()).await;

        // Stage 1: create the module.
        let file = dir.path().join("u.routes");
        write_sync(&file, "GET /users");
        {
            let router = router.clone();
            wait_until("GET /users registered", move || {
                matches!(router.lookup("/users", &Method::GET), RouteMatch::Matched(_))
            })
            .await;
        }
        {
            let events = events.clone();
            wait_until("added notification", move || events.added_count() == 1).await;
        }
        let (added_file, added_paths) = events.added.lock().unwrap()[0].clone();
        assert_eq!(added_file, file);
        assert_eq!(added_paths, vec!["/users".to_string()]);

        // Stage 2: overwrite, adding a method.
        write_sync(&file, "GET /users\nPOST /users");
        {
            let router = router.clone();
            wait_until("POST /users registered", move || {
                matches!(router.lookup("/users", &Method::POST), RouteMatch::Matched(_))
            })
            .await;
        }
        // The write burst collapsed into a single change notification.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(events.changed_count(), 1);

        // Stage 3: delete the module.
        std::fs::remove_file(&file).unwrap();
        {
            let router = router.clone();
            wait_until("route unregistered", move || {
                matches!(router.lookup("/users", &Method::GET), RouteMatch::NotFound)
            })
            .await;
        }
        {
            let events = events.clone();
            wait_until("removed notification", move || events.removed_count() == 1).await;
        }
        let (removed_file, removed_paths) = events.removed.lock().unwrap()[0].clone();
        assert_eq!(removed_file, file);
        assert_eq!(removed_paths, vec!["/users".to_string()]);

        watcher.close();
    }

    #[tokio::test]
    async fn test_rewrite_with_identical_content_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stable.routes");
        write_sync(&file, "GET /stable");

        let loader = ManifestLoader::new();
        let events = Arc::new(RecordingEvents::default());
        let (router, watcher) = start_watcher(dir.path(), loader, events.clone()).await;

        // Picked up by the initial scan, not an event.
        assert!(matches!(
            router.lookup("/stable", &Method::GET),
            RouteMatch::Matched(_)
        ));
        assert_eq!(events.added_count(), 0);

        // Touch the file with identical bytes: the fingerprint is
        // unchanged, so no notification fires.
        tokio::time::sleep(Duration::from_millis(20)).await;
        write_sync(&file, "GET /stable");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(events.changed_count(), 0);

        watcher.close();
    }

    #[tokio::test]
    async fn test_burst_of_writes_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ManifestLoader::new();
        let events = Arc::new(RecordingEvents::default());
        let (_router, watcher) = start_watcher(dir.path(), loader.clone(), events.clone()).await;

        let file = dir.path().join("burst.routes");
        for i in 0..5 {
            write_sync(&file, &format!("GET /burst-{i}"));
        }

        {
            let events = events.clone();
            wait_until("burst settles into one add", move || {
                events.added_count() == 1
            })
            .await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        // One debounced load for the whole burst.
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(events.added_count() + events.changed_count(), 1);

        watcher.close();
    }

    #[tokio::test]
    async fn test_broken_module_reports_error_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flaky.routes");
        write_sync(&file, "GET /flaky");

        let loader = ManifestLoader::new();
        let events = Arc::new(RecordingEvents::default());
        let (router, watcher) = start_watcher(dir.path(), loader, events.clone()).await;

        assert!(matches!(
            router.lookup("/flaky", &Method::GET),
            RouteMatch::Matched(_)
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        write_sync(&file, "poison");
        {
            let events = events.clone();
            wait_until("loader error reported", move || {
                !events.errors.lock().unwrap().is_empty()
            })
            .await;
        }
        // The previous routes survive a failed reload.
        assert!(matches!(
            router.lookup("/flaky", &Method::GET),
            RouteMatch::Matched(_)
        ));

        watcher.close();
    }

    #[tokio::test]
    async fn test_close_drains_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ManifestLoader::new();
        let events = Arc::new(RecordingEvents::default());
        let (router, watcher) = start_watcher(dir.path(), loader, events.clone()).await;

        write_sync(&dir.path().join("late.routes"), "GET /late");
        // Close before the debounce window elapses; the pending timer
        // must be dropped, not processed.
        watcher.close();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(events.added_count(), 0);
        assert!(matches!(
            router.lookup("/late", &Method::GET),
            RouteMatch::NotFound
        ));
    }
}
