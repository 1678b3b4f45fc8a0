//! File watcher that re-runs categories whose watch globs match a change.
//!
//! Raw notify events are coalesced over a short window. Each watched
//! category owns a worker with a one-slot queue: a change arriving while the
//! category is running leaves at most one re-run pending, and runs of one
//! category never overlap. Categories run independently of each other.

use crate::reload::ReloadHub;
use crate::runner::run_category;
use assetline_core::registry::Category;
use assetline_core::TransformTask;
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Event coalescing window.
const COALESCE_WINDOW_MS: u64 = 100;

const CATEGORY_COUNT: usize = Category::ALL.len();

/// Per-category watcher over one project root.
#[derive(Debug)]
pub struct Watcher {
    root: PathBuf,
    tasks: Vec<Arc<TransformTask>>,
    hub: ReloadHub,
    runs: Arc<[AtomicU64; CATEGORY_COUNT]>,
    ready: Notify,
}

impl Watcher {
    /// Watch `root` for the given tasks. Tasks of unwatched categories are ignored.
    #[must_use]
    pub fn new(root: &Path, tasks: Vec<Arc<TransformTask>>, hub: ReloadHub) -> Self {
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let tasks = tasks
            .into_iter()
            .filter(|task| task.paths().is_watched())
            .collect();
        Self {
            root,
            tasks,
            hub,
            runs: Arc::new(Default::default()),
            ready: Notify::new(),
        }
    }

    /// Categories this watcher re-runs.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.tasks.iter().map(|task| task.category())
    }

    /// Number of runs started for `category` since [`Watcher::run`] began.
    #[must_use]
    pub fn run_count(&self, category: Category) -> u64 {
        self.runs[category.index()].load(Ordering::SeqCst)
    }

    /// Resolves once the filesystem watch is registered.
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }

    /// Watch until the process ends.
    ///
    /// # Errors
    /// Returns an error if the root is not a directory or the OS watcher
    /// cannot be created.
    pub async fn run(&self) -> Result<(), WatchError> {
        if !self.root.is_dir() {
            return Err(WatchError::InvalidRoot(self.root.display().to_string()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if should_process_event(&event) {
                        if let Err(e) = tx.send(event.paths) {
                            warn!(error = %e, "Failed to send watch event");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Watch error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        let workers: Vec<(Arc<TransformTask>, mpsc::Sender<()>)> = self
            .tasks
            .iter()
            .map(|task| (task.clone(), self.spawn_worker(task.clone())))
            .collect();

        for task in &self.tasks {
            debug!(category = %task.category(), "Watching category");
        }
        info!(root = %self.root.display(), categories = workers.len(), "Watching for changes");
        self.ready.notify_one();

        let mut pending: HashSet<PathBuf> = HashSet::new();
        let mut last_event = Instant::now();
        let window = Duration::from_millis(COALESCE_WINDOW_MS);

        loop {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(Some(paths)) => {
                    pending.extend(paths);
                    last_event = Instant::now();
                }
                Ok(None) => {
                    debug!("Watch event channel closed");
                    break;
                }
                Err(_) => {
                    if pending.is_empty() || last_event.elapsed() < window {
                        continue;
                    }
                    debug!(count = pending.len(), "Processing coalesced file events");
                    self.dispatch(&pending, &workers);
                    pending.clear();
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    fn dispatch(&self, changed: &HashSet<PathBuf>, workers: &[(Arc<TransformTask>, mpsc::Sender<()>)]) {
        for (task, trigger) in workers {
            let hit = changed.iter().find(|path| {
                path.strip_prefix(&self.root)
                    .is_ok_and(|rel| task.paths().matches_watch(rel))
            });
            let Some(path) = hit else {
                continue;
            };

            debug!(category = %task.category(), path = %path.display(), "Change matched");
            // A full queue means a re-run is already pending.
            if trigger.try_send(()).is_err() {
                debug!(category = %task.category(), "Re-run already pending");
            }
        }
    }

    fn spawn_worker(&self, task: Arc<TransformTask>) -> mpsc::Sender<()> {
        let hub = self.hub.clone();
        let category = task.category();
        spawn_serial(category, self.runs.clone(), move || {
            let task = task.clone();
            let hub = hub.clone();
            async move {
                if let Err(e) = run_category(task, &hub).await {
                    error!(category = %category, error = %e, "Task panicked");
                }
            }
        })
    }
}

/// Start a worker that calls `run` once per trigger, one run at a time.
///
/// The queue holds one trigger, so triggers sent while a run is in progress
/// collapse into a single follow-up run.
fn spawn_serial<F, Fut>(
    category: Category,
    runs: Arc<[AtomicU64; CATEGORY_COUNT]>,
    run: F,
) -> mpsc::Sender<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (trigger, mut queued) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        while queued.recv().await.is_some() {
            runs[category.index()].fetch_add(1, Ordering::SeqCst);
            run().await;
        }
    });
    trigger
}

/// Check if we should process this event.
fn should_process_event(event: &Event) -> bool {
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => false,
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any) => true,
        EventKind::Remove(RemoveKind::File | RemoveKind::Any) => true,
        // Ignore directories, metadata changes, and access events
        _ => false,
    }
}

/// Watcher error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    InvalidRoot(String),
    WatcherFailed(String),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRoot(root) => write!(f, "Invalid watch root: {root}"),
            Self::WatcherFailed(msg) => write!(f, "Watcher failed: {msg}"),
        }
    }
}

impl std::error::Error for WatchError {}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_core::registry::Registry;
    use assetline_core::task::TaskOptions;
    use notify::event::{AccessKind, DataChange, MetadataKind};
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn event(kind: EventKind) -> Event {
        Event::new(kind).add_path(PathBuf::from("/p/src/js/app.js"))
    }

    #[test]
    fn test_should_process_event() {
        assert!(should_process_event(&event(EventKind::Create(CreateKind::File))));
        assert!(should_process_event(&event(EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        )))));
        assert!(should_process_event(&event(EventKind::Remove(RemoveKind::File))));
        assert!(!should_process_event(&event(EventKind::Create(CreateKind::Folder))));
        assert!(!should_process_event(&event(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Any
        )))));
        assert!(!should_process_event(&event(EventKind::Access(AccessKind::Any))));
    }

    #[test]
    fn test_unwatched_categories_are_dropped() {
        let dir = tempdir().unwrap();
        let compiled = Registry::default().compile(dir.path()).unwrap();
        let tasks = compiled
            .iter()
            .map(|c| Arc::new(TransformTask::new(c.clone(), TaskOptions::default())))
            .collect();

        let watcher = Watcher::new(dir.path(), tasks, ReloadHub::default());
        let categories: Vec<_> = watcher.categories().collect();
        assert!(!categories.contains(&Category::ServerConfig));
        assert_eq!(categories.len(), 5);
        assert_eq!(watcher.run_count(Category::Scripts), 0);
    }

    #[tokio::test]
    async fn test_triggers_during_a_run_leave_one_rerun() {
        let runs: Arc<[AtomicU64; CATEGORY_COUNT]> = Arc::new(Default::default());
        let active = Arc::new(AtomicU64::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));

        let (in_run, seen_overlap) = (active.clone(), overlapped.clone());
        let trigger = spawn_serial(Category::Scripts, runs.clone(), move || {
            let (active, overlapped) = (in_run.clone(), seen_overlap.clone());
            async move {
                if active.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        });

        trigger.try_send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(active.load(Ordering::SeqCst), 1);

        let accepted = (0..10).filter(|_| trigger.try_send(()).is_ok()).count();
        assert_eq!(accepted, 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(runs[Category::Scripts.index()].load(Ordering::SeqCst), 2);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let watcher = Watcher::new(&missing, vec![], ReloadHub::default());
        assert!(matches!(
            watcher.run().await,
            Err(WatchError::InvalidRoot(_))
        ));
    }
}
