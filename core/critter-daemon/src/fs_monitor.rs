//! Filesystem watch producing `file-changed` / `file-added` events.
//!
//! Only directories that pass the path filter and the depth limit get an OS
//! watch, one non-recursive watch each, so ignored trees such as
//! `node_modules/` cost nothing. Directories that appear later are picked up
//! by the stabilizer thread.
//!
//! Raw notify events are not forwarded directly. Each path waits in the
//! [`Stabilizer`] until it has been quiet for the stability threshold, so an
//! editor's create-truncate-write burst is reported once. Pre-existing files
//! produce nothing: notify reports changes only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use critter_core::{CritterError, PathFilter, Result};
use critter_protocol::{now_ms, ActivityEvent, ActivityKind};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::host::EventSink;

pub const DEFAULT_MAX_DEPTH: usize = 99;
/// Trees with more entries than this are watched to [`LARGE_TREE_DEPTH`] only.
pub const LARGE_TREE_ENTRY_THRESHOLD: usize = 10_000;
pub const LARGE_TREE_DEPTH: usize = 6;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub stability_threshold: Duration,
    /// Overrides the size heuristic when set.
    pub max_depth: Option<usize>,
    pub filter: PathFilter,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            stability_threshold: Duration::from_millis(100),
            max_depth: None,
            filter: PathFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawChange {
    Created,
    Modified,
    Removed,
}

/// Maps a notify event kind onto the changes we track. Access and
/// metadata-only events map to `None`. The source side of a rename is a
/// removal.
pub(crate) fn classify(kind: &EventKind) -> Option<RawChange> {
    match kind {
        EventKind::Create(_) => Some(RawChange::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(RawChange::Removed),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(_)) => Some(RawChange::Modified),
        EventKind::Remove(_) => Some(RawChange::Removed),
        _ => None,
    }
}

/// Per-path changes carried by one notify event. A two-path rename reports
/// its source as removed and only its destination as changed.
pub(crate) fn changes_for(event: &Event) -> Vec<(PathBuf, RawChange)> {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        let Some((to, from)) = event.paths.split_last() else {
            return Vec::new();
        };
        return from
            .iter()
            .map(|path| (path.clone(), RawChange::Removed))
            .chain(std::iter::once((to.clone(), RawChange::Modified)))
            .collect();
    }
    let Some(change) = classify(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .map(|path| (path.clone(), change))
        .collect()
}

/// True for event kinds that can bring a new directory into the tree.
fn may_add_directory(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    created: bool,
    last_seen: Instant,
}

/// Holds paths until they have been quiet for `threshold`.
#[derive(Debug)]
pub(crate) struct Stabilizer {
    threshold: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Stabilizer {
    pub(crate) fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, path: PathBuf, change: RawChange, at: Instant) {
        match change {
            RawChange::Removed => {
                self.pending.remove(&path);
            }
            RawChange::Created | RawChange::Modified => {
                let entry = self.pending.entry(path).or_insert(Pending {
                    created: false,
                    last_seen: at,
                });
                entry.created |= change == RawChange::Created;
                entry.last_seen = at;
            }
        }
    }

    /// Removes and returns every path quiet since `now - threshold`.
    pub(crate) fn drain_ready(&mut self, now: Instant) -> Vec<(PathBuf, ActivityKind)> {
        let threshold = self.threshold;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.last_seen) >= threshold)
            .map(|(path, _)| path.clone())
            .collect();

        let mut drained: Vec<(PathBuf, ActivityKind)> = ready
            .into_iter()
            .filter_map(|path| {
                let pending = self.pending.remove(&path)?;
                let kind = if pending.created {
                    ActivityKind::FileAdded
                } else {
                    ActivityKind::FileChanged
                };
                Some((path, kind))
            })
            .collect();
        drained.sort_by(|left, right| left.0.cmp(&right.0));
        drained
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|pending| pending.last_seen + self.threshold)
            .min()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Depth of `path` below `root`: direct children are depth 0.
pub(crate) fn depth_below(root: &Path, path: &Path) -> Option<usize> {
    let relative = path.strip_prefix(root).ok()?;
    Some(relative.components().count().saturating_sub(1))
}

/// Ignore check on the part of `path` below `root`, so a root that itself
/// sits under a directory such as `build/` is still watched.
pub(crate) fn ignored_below(filter: &PathFilter, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    filter.is_ignored(&relative.to_string_lossy())
}

/// Directories to watch at or below `start`, and the files already inside
/// them.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct WatchPlan {
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Walks `start` (the root, or a directory that appeared under it) and keeps
/// the directories whose files fall within `depth`. Ignored subtrees are not
/// entered.
pub(crate) fn plan_watches(root: &Path, start: &Path, depth: usize, filter: &PathFilter) -> WatchPlan {
    let mut plan = WatchPlan::default();
    let Ok(relative) = start.strip_prefix(root) else {
        return plan;
    };
    // Files directly inside `start` sit at this depth.
    let base = relative.components().count();
    if base > depth || ignored_below(filter, root, start) {
        return plan;
    }

    let walker = WalkDir::new(start)
        .max_depth((depth - base).saturating_add(1))
        .into_iter()
        .filter_entry(|entry| !ignored_below(filter, root, entry.path()));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            if base + entry.depth() <= depth {
                plan.dirs.push(entry.into_path());
            }
        } else if entry.depth() > 0 {
            plan.files.push(entry.into_path());
        }
    }
    plan
}

/// Depth limit for `root`: the override when given, otherwise a shallower
/// watch for very large trees.
pub fn effective_depth(root: &Path, max_depth: Option<usize>, filter: &PathFilter) -> usize {
    if let Some(depth) = max_depth {
        return depth;
    }

    let entries = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !ignored_below(filter, root, entry.path()))
        .filter_map(|entry| entry.ok())
        .take(LARGE_TREE_ENTRY_THRESHOLD + 1)
        .count();

    if entries > LARGE_TREE_ENTRY_THRESHOLD {
        info!(
            root = %root.display(),
            depth = LARGE_TREE_DEPTH,
            "Large tree; limiting watch depth"
        );
        LARGE_TREE_DEPTH
    } else {
        DEFAULT_MAX_DEPTH
    }
}

enum MonitorSignal {
    Raw(PathBuf, RawChange),
    DirAppeared(PathBuf),
    Stop,
}

type SharedWatcher = Arc<Mutex<Option<RecommendedWatcher>>>;

fn lock(watcher: &SharedWatcher) -> MutexGuard<'_, Option<RecommendedWatcher>> {
    watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Adds a non-recursive watch per directory. Returns how many succeeded.
fn watch_dirs(watcher: &mut RecommendedWatcher, dirs: &[PathBuf]) -> usize {
    dirs.iter()
        .filter(|dir| match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, path = %dir.display(), "Failed to watch directory");
                false
            }
        })
        .count()
}

/// What the stabilizer thread needs to extend the watch to new directories.
struct WatchScope {
    watcher: SharedWatcher,
    root: PathBuf,
    depth: usize,
    filter: PathFilter,
}

impl WatchScope {
    /// Watches a directory that appeared after start and returns the files
    /// already inside it, which the OS will never report.
    fn extend(&self, dir: &Path) -> Vec<PathBuf> {
        let plan = plan_watches(&self.root, dir, self.depth, &self.filter);
        let mut guard = lock(&self.watcher);
        let Some(watcher) = guard.as_mut() else {
            return Vec::new();
        };
        let watched = watch_dirs(watcher, &plan.dirs);
        if watched > 0 {
            debug!(path = %dir.display(), watched, "Watching new directory");
        }
        plan.files
    }
}

pub struct FsMonitor {
    settings: MonitorSettings,
    root: Option<PathBuf>,
    watcher: SharedWatcher,
    control: Option<mpsc::Sender<MonitorSignal>>,
    stabilizer: Option<JoinHandle<()>>,
}

impl FsMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            root: None,
            watcher: Arc::new(Mutex::new(None)),
            control: None,
            stabilizer: None,
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.watcher).is_some()
    }

    #[allow(dead_code)]
    pub fn root(&self) -> Result<&Path> {
        self.root.as_deref().ok_or(CritterError::MonitorNotStarted)
    }

    /// Begins watching `root`. Restarting an active monitor stops it first.
    pub fn start(&mut self, root: &Path, sink: EventSink) -> Result<()> {
        self.stop();

        let root = fs_err::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let filter = self.settings.filter.clone();
        let depth = effective_depth(&root, self.settings.max_depth, &filter);
        let (control_tx, control_rx) = mpsc::channel();

        let callback_tx = control_tx.clone();
        let callback_root = root.clone();
        let callback_filter = filter.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "Filesystem watch error");
                    return;
                }
            };
            let adds_dirs = may_add_directory(&event.kind);
            for (path, change) in changes_for(&event) {
                if ignored_below(&callback_filter, &callback_root, &path) {
                    continue;
                }
                match depth_below(&callback_root, &path) {
                    Some(level) if level <= depth => {}
                    _ => continue,
                }
                if change != RawChange::Removed && path.is_dir() {
                    if adds_dirs {
                        let _ = callback_tx.send(MonitorSignal::DirAppeared(path));
                    }
                    continue;
                }
                let _ = callback_tx.send(MonitorSignal::Raw(path, change));
            }
        })
        .map_err(|err| CritterError::WatchFailed {
            path: root.clone(),
            details: err.to_string(),
        })?;

        // The root comes first in walk order; without it there is no monitor.
        let plan = plan_watches(&root, &root, depth, &filter);
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|err| CritterError::WatchFailed {
                path: root.clone(),
                details: err.to_string(),
            })?;
        let nested: Vec<PathBuf> = plan.dirs.into_iter().filter(|dir| *dir != root).collect();
        let watched = 1 + watch_dirs(&mut watcher, &nested);
        *lock(&self.watcher) = Some(watcher);

        let scope = WatchScope {
            watcher: Arc::clone(&self.watcher),
            root: root.clone(),
            depth,
            filter,
        };
        let threshold = self.settings.stability_threshold;
        self.stabilizer = Some(thread::spawn(move || {
            run_stabilizer(threshold, control_rx, sink, scope)
        }));
        self.control = Some(control_tx);
        info!(root = %root.display(), depth, watched, "Filesystem monitor started");
        self.root = Some(root);
        Ok(())
    }

    /// Releases the OS watches and joins the stabilizer; pending paths are
    /// dropped. Safe to call repeatedly.
    pub fn stop(&mut self) {
        // No callbacks can fire once the watcher is gone.
        let watcher = lock(&self.watcher).take();
        let was_active = watcher.is_some();
        drop(watcher);
        if let Some(control) = self.control.take() {
            let _ = control.send(MonitorSignal::Stop);
        }
        if let Some(stabilizer) = self.stabilizer.take() {
            if stabilizer.join().is_err() {
                warn!("Filesystem stabilizer thread panicked");
            }
        }
        self.root = None;
        if was_active {
            debug!("Filesystem monitor stopped");
        }
    }
}

impl Drop for FsMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_stabilizer(
    threshold: Duration,
    control: mpsc::Receiver<MonitorSignal>,
    sink: EventSink,
    scope: WatchScope,
) {
    let mut stabilizer = Stabilizer::new(threshold);

    loop {
        let signal = match stabilizer.next_deadline() {
            Some(deadline) => {
                control.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => control.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match signal {
            Ok(MonitorSignal::Raw(path, change)) => {
                stabilizer.record(path, change, Instant::now());
            }
            Ok(MonitorSignal::DirAppeared(dir)) => {
                let now = Instant::now();
                for file in scope.extend(&dir) {
                    stabilizer.record(file, RawChange::Created, now);
                }
            }
            Ok(MonitorSignal::Stop) | Err(RecvTimeoutError::Disconnected) => {
                if stabilizer.len() > 0 {
                    debug!(pending = stabilizer.len(), "Dropping unstable paths on stop");
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        for (path, kind) in stabilizer.drain_ready(Instant::now()) {
            let path = path.to_string_lossy().into_owned();
            let timestamp = now_ms();
            let event = match kind {
                ActivityKind::FileAdded => ActivityEvent::file_added(path, timestamp),
                _ => ActivityEvent::file_changed(path, timestamp),
            };
            sink(event);
        }
    }
}
