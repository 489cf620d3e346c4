//! Filesystem change detection for ticket roots and the project registry.
//!
//! Watches each active project's ticket directory (recursively) plus the
//! global registry directory, and turns raw `notify` events into debounced,
//! typed `ChangeEvent`s. Uses `notify::RecommendedWatcher` with a tokio
//! channel bridge and custom debouncing.
//!
//! Registry events are applied before ticket events within a batch: a new
//! descriptor can add a watched root and a deleted descriptor removes one,
//! and the ticket events of the same batch must see the updated root set.
//!
//! For every event, the derived-data cache entry for the path is dropped
//! synchronously before the event is broadcast, so any read that observes
//! the event also observes post-event data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::broadcast::Broadcaster;
use crate::cache::DerivedCache;
use crate::error::{CorkboardError, Result};
use crate::events::{ChangeEvent, ChangeKind};
use crate::project::{Project, ProjectRegistry};

/// Capacity of the bounded channel bridging `notify` events to the tokio
/// event loop. When the channel is full, the watcher callback sets a
/// "resync needed" flag instead of enqueuing individual events.
const CHANNEL_CAPACITY: usize = 512;

/// Maximum number of entries in the pending event map. When this cap is
/// exceeded, the map is cleared and the cache is flushed wholesale instead.
const PENDING_CAP: usize = 1024;

/// Where a path landed when classified against the watched roots.
enum PathClass {
    Ticket { project_id: String },
    Registry,
    Ignored,
}

/// Shared state the event loop mutates as roots come and go.
struct WatchState {
    watcher: Mutex<notify::RecommendedWatcher>,
    /// Ticket root -> project code.
    roots: DashMap<PathBuf, String>,
    /// Descriptor path -> (project code, ticket root).
    descriptors: DashMap<PathBuf, (String, PathBuf)>,
    registry_dir: PathBuf,
    cache: Arc<DerivedCache>,
    broadcaster: Arc<Broadcaster>,
}

impl WatchState {
    fn classify(&self, path: &Path) -> PathClass {
        if path.parent() == Some(self.registry_dir.as_path()) {
            let is_descriptor = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if is_descriptor {
                return PathClass::Registry;
            }
            return PathClass::Ignored;
        }
        if path.extension().is_none_or(|ext| ext != "md") {
            return PathClass::Ignored;
        }
        for entry in self.roots.iter() {
            if path.starts_with(entry.key()) {
                return PathClass::Ticket {
                    project_id: entry.value().clone(),
                };
            }
        }
        PathClass::Ignored
    }

    /// Start watching a project's ticket root. A missing or unreadable root
    /// is tolerated; a later registry event can re-register it.
    fn watch_project(&self, project: &Project) {
        // Canonicalize so event paths (which the OS reports resolved) match
        // the root under prefix comparison.
        let configured = project.tickets_dir();
        let root = configured.canonicalize().unwrap_or(configured);
        if let Err(e) = self
            .watcher
            .lock()
            .watch(&root, RecursiveMode::Recursive)
        {
            eprintln!(
                "Warning: failed to watch ticket directory {}: {e}",
                root.display()
            );
            return;
        }
        self.roots.insert(root.clone(), project.code.clone());
        if let Some(descriptor) = &project.descriptor_path {
            self.descriptors
                .insert(descriptor.clone(), (project.code.clone(), root));
        }
    }

    fn unwatch_root(&self, root: &Path) {
        // Unwatch can fail if the OS already dropped the watch with the
        // directory; either way the root is no longer ours.
        let _ = self.watcher.lock().unwatch(root);
        self.roots.remove(root);
    }
}

/// Filesystem change detector with an explicit lifecycle.
///
/// Construct one per registry via [`ChangeDetector::start`]; tests point
/// independent instances at temporary directories. Dropping the detector
/// (or calling [`ChangeDetector::stop`]) stops watching.
pub struct ChangeDetector {
    state: Arc<WatchState>,
    task: tokio::task::JoinHandle<()>,
}

impl ChangeDetector {
    /// Start watching the registry directory and every active project root.
    ///
    /// Events flow: filesystem -> notify callback -> bounded bridge ->
    /// debounced batches -> cache invalidation -> broadcaster.
    pub fn start(
        registry: &ProjectRegistry,
        cache: Arc<DerivedCache>,
        broadcaster: Arc<Broadcaster>,
        debounce: Duration,
    ) -> Result<ChangeDetector> {
        let (bridge_tx, bridge_rx) = tokio::sync::mpsc::channel::<notify::Event>(CHANNEL_CAPACITY);

        // Shared flag: when the bounded channel is full, the notify callback
        // sets this instead of blocking. The event loop flushes the cache
        // wholesale when it sees the flag.
        let resync_needed = Arc::new(AtomicBool::new(false));

        let watcher = {
            let tx = bridge_tx;
            let resync = Arc::clone(&resync_needed);
            notify::RecommendedWatcher::new(
                move |res: std::result::Result<notify::Event, notify::Error>| match res {
                    Ok(event) => {
                        if tx.try_send(event).is_err() {
                            if !resync.swap(true, Ordering::Relaxed) {
                                eprintln!(
                                    "Warning: watcher channel full (capacity {CHANNEL_CAPACITY}), \
                                     flushing derived-data cache"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        eprintln!("Warning: filesystem watcher error: {e}");
                    }
                },
                notify::Config::default(),
            )
            .map_err(|e| {
                CorkboardError::Watcher(format!("failed to create filesystem watcher: {e}"))
            })?
        };

        let registry_dir = registry
            .dir()
            .canonicalize()
            .unwrap_or_else(|_| registry.dir().to_path_buf());
        let state = Arc::new(WatchState {
            watcher: Mutex::new(watcher),
            roots: DashMap::new(),
            descriptors: DashMap::new(),
            registry_dir,
            cache,
            broadcaster,
        });

        // Watch the registry directory itself (non-recursively). If it does
        // not exist yet, project registration still works once it appears and
        // the detector is restarted; per-project watches below are unaffected.
        if state.registry_dir.exists() {
            if let Err(e) = state
                .watcher
                .lock()
                .watch(&state.registry_dir, RecursiveMode::NonRecursive)
            {
                eprintln!(
                    "Warning: failed to watch registry directory {}: {e}",
                    state.registry_dir.display()
                );
            }
        } else {
            eprintln!(
                "Note: registry directory {} not found — registry watching is disabled",
                state.registry_dir.display()
            );
        }

        for project in registry.load_all()? {
            if project.active {
                state.watch_project(&project);
            }
        }

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            run_event_loop(bridge_rx, task_state, resync_needed, debounce).await;
        });

        Ok(ChangeDetector { state, task })
    }

    /// Stop watching. Pending batches are abandoned.
    pub fn stop(self) {
        self.task.abort();
        // Dropping `state` (and with it the notify watcher) deregisters the
        // OS watches once the event loop task is gone.
    }

    /// Currently watched ticket roots (for diagnostics and tests).
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.state.roots.iter().map(|e| e.key().clone()).collect()
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Background event loop: receives notify events, debounces them, and
/// processes batched changes.
async fn run_event_loop(
    mut bridge_rx: tokio::sync::mpsc::Receiver<notify::Event>,
    state: Arc<WatchState>,
    resync_needed: Arc<AtomicBool>,
    debounce: Duration,
) {
    // Accumulate events keyed by path -> last event kind.
    let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();

    loop {
        let event = match bridge_rx.recv().await {
            Some(e) => e,
            None => break, // Channel closed — watcher was dropped.
        };
        accumulate_event(&mut pending, &event);

        // Drain additional events within the debounce window. Events for the
        // same file collapse onto one pending entry; events for different
        // files ride along in the same batch.
        loop {
            match tokio::time::timeout(debounce, bridge_rx.recv()).await {
                Ok(Some(e)) => {
                    accumulate_event(&mut pending, &e);
                    if pending.len() > PENDING_CAP {
                        eprintln!(
                            "Warning: pending event map exceeded cap ({PENDING_CAP} entries), \
                             flushing derived-data cache"
                        );
                        pending.clear();
                        resync_needed.store(true, Ordering::Relaxed);
                    }
                }
                Ok(None) => {
                    process_batch(&mut pending, &state, &resync_needed);
                    return;
                }
                Err(_) => break, // Debounce window elapsed.
            }
        }

        process_batch(&mut pending, &state, &resync_needed);
    }
}

/// Fold a notify event into the pending map (last-writer-wins per path).
fn accumulate_event(pending: &mut HashMap<PathBuf, ChangeKind>, event: &notify::Event) {
    let kind = match classify_event_kind(event.kind) {
        Some(kind) => kind,
        None => return,
    };
    for path in &event.paths {
        pending.insert(path.clone(), kind);
    }
}

fn classify_event_kind(kind: EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Process a debounced batch: registry changes first (they can add or
/// remove watched roots), then ticket changes. For each event, the cache is
/// invalidated before the broadcast.
fn process_batch(
    pending: &mut HashMap<PathBuf, ChangeKind>,
    state: &Arc<WatchState>,
    resync_needed: &AtomicBool,
) {
    if resync_needed.swap(false, Ordering::Relaxed) {
        pending.clear();
        state.cache.clear();
        return;
    }
    if pending.is_empty() {
        return;
    }

    let mut registry_events: Vec<(PathBuf, ChangeKind)> = Vec::new();
    let mut ticket_events: Vec<(PathBuf, ChangeKind, String)> = Vec::new();

    for (path, kind) in pending.drain() {
        // A removed watched root takes its watch with it.
        if kind == ChangeKind::Deleted && state.roots.contains_key(&path) {
            state.unwatch_root(&path);
            continue;
        }
        match state.classify(&path) {
            PathClass::Registry => registry_events.push((path, kind)),
            PathClass::Ticket { project_id } => ticket_events.push((path, kind, project_id)),
            PathClass::Ignored => {}
        }
    }

    for (path, kind) in registry_events {
        apply_registry_change(state, &path, kind);
        state.cache.invalidate(&path);
        state.broadcaster.broadcast(&ChangeEvent::Registry { kind, path });
    }

    for (path, kind, project_id) in ticket_events {
        state.cache.invalidate(&path);
        state.broadcaster.broadcast(&ChangeEvent::Ticket {
            kind,
            path,
            project_id,
        });
    }
}

/// Update the watched root set for a registry descriptor change.
fn apply_registry_change(state: &Arc<WatchState>, path: &Path, kind: ChangeKind) {
    match kind {
        ChangeKind::Created | ChangeKind::Modified => {
            match ProjectRegistry::load_descriptor(path) {
                Ok(project) if project.active => {
                    // Re-registering an already-watched root is harmless;
                    // this is also the path by which a root that was missing
                    // at startup gets picked up later.
                    let new_root = project
                        .tickets_dir()
                        .canonicalize()
                        .unwrap_or_else(|_| project.tickets_dir());
                    if let Some(entry) = state.descriptors.get(path) {
                        let (_, old_root) = entry.value().clone();
                        drop(entry);
                        if old_root != new_root {
                            state.unwatch_root(&old_root);
                        }
                    }
                    state.watch_project(&project);
                }
                Ok(_) => {
                    // Deactivated: stop watching its root.
                    if let Some((_, (_, root))) = state.descriptors.remove(path) {
                        state.unwatch_root(&root);
                    }
                }
                Err(e) => {
                    eprintln!(
                        "Warning: ignoring unreadable project descriptor {}: {e}",
                        path.display()
                    );
                }
            }
        }
        ChangeKind::Deleted => {
            if let Some((_, (code, root))) = state.descriptors.remove(path) {
                tracing::debug!("project {code} descriptor removed, unwatching {}", root.display());
                state.unwatch_root(&root);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use tokio::time::{Duration, sleep, timeout};

    use super::*;
    use crate::events::{PushKind, PushMessage};

    const TEST_DEBOUNCE: Duration = Duration::from_millis(100);

    struct Harness {
        _tmp: TempDir,
        registry: ProjectRegistry,
        project: Project,
        cache: Arc<DerivedCache>,
        broadcaster: Arc<Broadcaster>,
    }

    fn setup() -> Harness {
        let tmp = TempDir::new().expect("failed to create temp dir");
        // Canonicalize so paths compare equal to what the OS watcher reports.
        let root = tmp.path().canonicalize().expect("failed to canonicalize");
        let registry = ProjectRegistry::new(root.join("registry"));

        let project = Project {
            code: "MDT".to_string(),
            name: "Markdown Ticket".to_string(),
            path: root.join("mdt"),
            tickets_path: "tickets".to_string(),
            active: true,
            document_discovery: None,
            descriptor_path: None,
        };
        fs::create_dir_all(project.tickets_dir()).unwrap();
        registry.save(&project).unwrap();

        Harness {
            _tmp: tmp,
            registry,
            project,
            cache: Arc::new(DerivedCache::new(Duration::from_secs(60), 64)),
            broadcaster: Broadcaster::new(),
        }
    }

    fn ticket_content(code: &str, title: &str) -> String {
        format!("---\ncode: {code}\nstatus: proposed\n---\n# {title}\n")
    }

    async fn next_data_message(
        sub: &mut crate::broadcast::Subscription,
        secs: u64,
    ) -> PushMessage {
        loop {
            let msg = timeout(Duration::from_secs(secs), sub.recv())
                .await
                .expect("timed out waiting for event")
                .expect("broadcaster gone");
            if !matches!(msg.kind, PushKind::Connection | PushKind::Heartbeat) {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn test_detects_ticket_creation() {
        let h = setup();
        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .expect("detector should start");
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        let path = h.project.tickets_dir().join("MDT-1-first.md");
        fs::write(&path, ticket_content("MDT-1", "First")).unwrap();

        let msg = next_data_message(&mut sub, 3).await;
        assert_eq!(msg.kind, PushKind::FileChange);
        let data = msg.data.unwrap();
        assert_eq!(data.project_id.as_deref(), Some("MDT"));
        assert!(data.path.ends_with("MDT-1-first.md"));

        detector.stop();
    }

    #[tokio::test]
    async fn test_cache_fresh_after_change_event() {
        let h = setup();
        let path = h.project.tickets_dir().join("MDT-2-cached.md");
        fs::write(&path, ticket_content("MDT-2", "Before")).unwrap();

        // Warm the cache before the watcher sees any change.
        let meta = h.cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Before"));

        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        fs::write(&path, ticket_content("MDT-2", "After")).unwrap();
        let _ = next_data_message(&mut sub, 3).await;

        // The event is only broadcast after the invalidation, so this read
        // must see the new content.
        let meta = h.cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("After"));

        detector.stop();
    }

    #[tokio::test]
    async fn test_deletion_invalidates_cache() {
        let h = setup();
        let path = h.project.tickets_dir().join("MDT-3-doomed.md");
        fs::write(&path, ticket_content("MDT-3", "Doomed")).unwrap();
        assert!(h.cache.get_content(&path).await.unwrap().is_some());

        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        fs::remove_file(&path).unwrap();
        let msg = next_data_message(&mut sub, 5).await;
        assert_eq!(msg.data.unwrap().event_type, ChangeKind::Deleted);

        assert!(h.cache.get_content(&path).await.unwrap().is_none());
        detector.stop();
    }

    #[tokio::test]
    async fn test_debounce_collapses_same_file_events() {
        let h = setup();
        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        let path = h.project.tickets_dir().join("MDT-4-rapid.md");
        for i in 0..5 {
            fs::write(&path, ticket_content("MDT-4", &format!("Rapid {i}"))).unwrap();
            sleep(Duration::from_millis(10)).await;
        }

        let _first = next_data_message(&mut sub, 3).await;
        // Allow any further batches to flush, then count what arrived. Five
        // writes inside one debounce window must not produce five events.
        sleep(TEST_DEBOUNCE * 3).await;
        let mut extra = 0;
        while sub.try_recv().is_some() {
            extra += 1;
        }
        assert!(extra < 4, "expected collapsed events, got {extra} extra");

        detector.stop();
    }

    #[tokio::test]
    async fn test_non_md_files_are_ignored() {
        let h = setup();
        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        fs::write(h.project.tickets_dir().join("notes.txt"), "not a ticket").unwrap();
        sleep(Duration::from_millis(400)).await;

        while let Some(msg) = sub.try_recv() {
            assert!(
                matches!(msg.kind, PushKind::Connection | PushKind::Heartbeat),
                "unexpected event for non-md file: {msg:?}"
            );
        }
        detector.stop();
    }

    #[tokio::test]
    async fn test_registry_event_adds_watched_root() {
        let h = setup();
        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(detector.watched_roots().len(), 1);

        // Register a second project while the detector is running.
        let second = Project {
            code: "AB".to_string(),
            name: "Second".to_string(),
            path: h.project.path.parent().unwrap().join("second"),
            tickets_path: "tickets".to_string(),
            active: true,
            document_discovery: None,
            descriptor_path: None,
        };
        fs::create_dir_all(second.tickets_dir()).unwrap();
        h.registry.save(&second).unwrap();

        let msg = next_data_message(&mut sub, 3).await;
        assert_eq!(msg.kind, PushKind::RegistryChange);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(detector.watched_roots().len(), 2);

        // Ticket events from the new root now flow.
        let path = second.tickets_dir().join("AB-1-hello.md");
        fs::write(&path, ticket_content("AB-1", "Hello")).unwrap();
        let msg = next_data_message(&mut sub, 3).await;
        assert_eq!(msg.data.unwrap().project_id.as_deref(), Some("AB"));

        detector.stop();
    }

    #[tokio::test]
    async fn test_registry_delete_removes_watched_root() {
        let h = setup();
        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        fs::remove_file(h.registry.descriptor_path_for("MDT")).unwrap();
        let msg = next_data_message(&mut sub, 3).await;
        assert_eq!(msg.kind, PushKind::RegistryChange);
        assert_eq!(msg.data.unwrap().event_type, ChangeKind::Deleted);

        sleep(Duration::from_millis(100)).await;
        assert!(detector.watched_roots().is_empty());
        detector.stop();
    }

    #[tokio::test]
    async fn test_deactivation_removes_watched_root() {
        let h = setup();
        let detector = ChangeDetector::start(
            &h.registry,
            Arc::clone(&h.cache),
            Arc::clone(&h.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let mut sub = h.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        h.registry.set_active("MDT", false).unwrap();
        let _ = next_data_message(&mut sub, 3).await;
        sleep(Duration::from_millis(100)).await;
        assert!(detector.watched_roots().is_empty());

        detector.stop();
    }

    #[tokio::test]
    async fn test_independent_detectors_do_not_interfere() {
        let a = setup();
        let b = setup();

        let det_a = ChangeDetector::start(
            &a.registry,
            Arc::clone(&a.cache),
            Arc::clone(&a.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();
        let det_b = ChangeDetector::start(
            &b.registry,
            Arc::clone(&b.cache),
            Arc::clone(&b.broadcaster),
            TEST_DEBOUNCE,
        )
        .unwrap();

        let mut sub_b = b.broadcaster.subscribe();
        sleep(Duration::from_millis(200)).await;

        // A change in store A must not reach store B's subscribers.
        let path = a.project.tickets_dir().join("MDT-9-only-a.md");
        fs::write(&path, ticket_content("MDT-9", "Only A")).unwrap();

        sleep(Duration::from_millis(500)).await;
        while let Some(msg) = sub_b.try_recv() {
            assert!(matches!(
                msg.kind,
                PushKind::Connection | PushKind::Heartbeat
            ));
        }

        det_a.stop();
        det_b.stop();
    }
}
