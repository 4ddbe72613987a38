//! Detects new commits in the watched repository.
//!
//! Two independent triggers feed the same idempotent [`CommitPoller::check_once`]:
//! a periodic deadline (every `poll_interval`) and a debounced deadline re-armed
//! by every change notify reports under the git directory. Both run on one
//! worker thread, so checks never overlap.

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use critter_core::{CritterError, Result};
use critter_protocol::{ActivityEvent, MAX_HISTORY_LIMIT};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::git::{GitAdapter, HistoricalCommit};
use crate::host::EventSink;

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    pub ref_debounce: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            ref_debounce: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default)]
struct PollerState {
    started: bool,
    is_repo: bool,
    watch_path: Option<PathBuf>,
    last_known_hash: Option<String>,
}

enum WorkerSignal {
    RefChanged,
    Stop,
}

pub struct CommitPoller<A: GitAdapter + 'static> {
    adapter: Arc<A>,
    settings: PollerSettings,
    state: Arc<Mutex<PollerState>>,
    control: Option<mpsc::Sender<WorkerSignal>>,
    worker: Option<JoinHandle<()>>,
    ref_watcher: Option<RecommendedWatcher>,
}

impl<A: GitAdapter + 'static> CommitPoller<A> {
    pub fn new(adapter: A, settings: PollerSettings) -> Self {
        Self {
            adapter: Arc::new(adapter),
            settings,
            state: Arc::new(Mutex::new(PollerState::default())),
            control: None,
            worker: None,
            ref_watcher: None,
        }
    }

    /// Seeds the hash a restored session last saw, so a commit made while the
    /// app was closed is reported on the first check. Call before `start`;
    /// the seed survives the restart `start` performs.
    pub fn set_last_known_hash(&self, hash: Option<String>) {
        lock(&self.state).last_known_hash = hash.filter(|hash| !hash.trim().is_empty());
    }

    #[allow(dead_code)]
    pub fn last_known_hash(&self) -> Option<String> {
        lock(&self.state).last_known_hash.clone()
    }

    /// True while started on a git work tree.
    pub fn is_active(&self) -> bool {
        let state = lock(&self.state);
        state.started && state.is_repo
    }

    /// Starts polling `path`. A path outside any work tree leaves the poller
    /// inactive without error.
    pub fn start(&mut self, path: &Path, sink: EventSink) -> Result<()> {
        let path = validate_watch_path(path)?;
        let seeded = lock(&self.state).last_known_hash.take();
        self.stop();
        lock(&self.state).last_known_hash = seeded;

        let is_repo = self.adapter.is_work_tree(&path);
        {
            let mut state = lock(&self.state);
            state.started = true;
            state.is_repo = is_repo;
            state.watch_path = Some(path.clone());
        }

        if !is_repo {
            info!(path = %path.display(), "Not a git work tree; commit polling disabled");
            return Ok(());
        }

        {
            let mut state = lock(&self.state);
            if state.last_known_hash.is_none() {
                state.last_known_hash = self.adapter.head_commit(&path).map(|head| head.hash);
            }
            debug!(
                path = %path.display(),
                hash = ?state.last_known_hash,
                "Commit poller seeded"
            );
        }

        let (control_tx, control_rx) = mpsc::channel();
        self.ref_watcher = self.watch_refs(&path, control_tx.clone());

        let adapter = Arc::clone(&self.adapter);
        let state = Arc::clone(&self.state);
        let settings = self.settings;
        self.worker = Some(thread::spawn(move || {
            run_worker(adapter.as_ref(), &state, settings, control_rx, sink)
        }));
        self.control = Some(control_tx);

        info!(path = %path.display(), "Commit poller started");
        Ok(())
    }

    /// Reads HEAD once and returns a commit event if it moved.
    #[allow(dead_code)]
    pub fn check_once(&self) -> Result<Option<ActivityEvent>> {
        check_head(self.adapter.as_ref(), &self.state)
    }

    /// Up to `limit` (capped) recent commits under `path`, newest first.
    pub fn recent_commits(&self, path: &Path, limit: usize) -> Vec<HistoricalCommit> {
        let limit = limit.min(MAX_HISTORY_LIMIT);
        if limit == 0 {
            return Vec::new();
        }
        self.adapter.recent_commits(path, limit)
    }

    /// Cancels both deadlines and the ref watch, joins the worker, and forgets
    /// the repository. Safe to call repeatedly.
    pub fn stop(&mut self) {
        // Dropping the watcher first guarantees no further ref signals.
        self.ref_watcher = None;
        if let Some(control) = self.control.take() {
            let _ = control.send(WorkerSignal::Stop);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Commit poller worker panicked");
            }
        }

        let mut state = lock(&self.state);
        if state.started {
            debug!("Commit poller stopped");
        }
        *state = PollerState::default();
    }

    fn watch_refs(
        &self,
        path: &Path,
        control: mpsc::Sender<WorkerSignal>,
    ) -> Option<RecommendedWatcher> {
        let git_dir = self.adapter.git_dir(path)?;

        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if event.paths.iter().any(|path| is_ref_path(path)) {
                    let _ = control.send(WorkerSignal::RefChanged);
                }
            }
        }) {
            Ok(watcher) => watcher,
            Err(err) => {
                warn!(error = %err, "Failed to create ref watcher; relying on periodic polling");
                return None;
            }
        };

        if let Err(err) = watcher.watch(&git_dir, RecursiveMode::NonRecursive) {
            warn!(error = %err, path = %git_dir.display(), "Failed to watch git dir");
            return None;
        }
        let heads = git_dir.join("refs").join("heads");
        if heads.is_dir() {
            if let Err(err) = watcher.watch(&heads, RecursiveMode::Recursive) {
                warn!(error = %err, path = %heads.display(), "Failed to watch refs/heads");
            }
        }
        Some(watcher)
    }
}

impl<A: GitAdapter + 'static> Drop for CommitPoller<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_ref_path(path: &Path) -> bool {
    let is_ref_file = path
        .file_name()
        .map(|name| name == "HEAD" || name == "packed-refs")
        .unwrap_or(false);
    is_ref_file
        || path
            .components()
            .collect::<Vec<_>>()
            .windows(2)
            .any(|pair| pair[0].as_os_str() == "refs" && pair[1].as_os_str() == "heads")
}

fn check_head<A: GitAdapter + ?Sized>(
    adapter: &A,
    state: &Mutex<PollerState>,
) -> Result<Option<ActivityEvent>> {
    // Held across the git call so concurrent checks cannot both report a hash.
    let mut state = lock(state);
    if !state.started {
        return Err(CritterError::PollerNotStarted);
    }
    if !state.is_repo {
        return Ok(None);
    }
    let Some(path) = state.watch_path.clone() else {
        return Ok(None);
    };
    let Some(head) = adapter.head_commit(&path) else {
        return Ok(None);
    };
    if state.last_known_hash.as_deref() == Some(head.hash.as_str()) {
        return Ok(None);
    }

    info!(
        hash = %head.hash.chars().take(8).collect::<String>(),
        author = %head.author,
        "Commit detected"
    );
    state.last_known_hash = Some(head.hash.clone());
    Ok(Some(ActivityEvent::commit(
        head.hash,
        head.message,
        head.author_timestamp_ms,
    )))
}

fn run_worker<A: GitAdapter + ?Sized>(
    adapter: &A,
    state: &Mutex<PollerState>,
    settings: PollerSettings,
    control: mpsc::Receiver<WorkerSignal>,
    sink: EventSink,
) {
    let mut next_poll = Instant::now() + settings.poll_interval;
    let mut debounce: Option<Instant> = None;

    loop {
        let now = Instant::now();
        let deadline = debounce.map_or(next_poll, |at| at.min(next_poll));
        let wait = deadline.saturating_duration_since(now);

        match control.recv_timeout(wait) {
            Ok(WorkerSignal::RefChanged) => {
                debounce = Some(Instant::now() + settings.ref_debounce);
                continue;
            }
            Ok(WorkerSignal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let mut due = false;
        if debounce.is_some_and(|at| at <= now) {
            debounce = None;
            due = true;
        }
        if next_poll <= now {
            next_poll = now + settings.poll_interval;
            due = true;
        }
        if !due {
            continue;
        }

        match check_head(adapter, state) {
            Ok(Some(event)) => sink(event),
            Ok(None) => {}
            // Stopped between the timeout and the check.
            Err(CritterError::PollerNotStarted) => break,
            Err(err) => warn!(error = %err, "Commit check failed"),
        }
    }
}

/// Normalizes a user-supplied watch root.
///
/// Rejects `~`-prefixed paths (the shell did not expand them) and any `..`
/// segment. Relative paths are resolved against the current directory.
pub fn validate_watch_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let invalid = |reason: &str| CritterError::InvalidWatchPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if raw.starts_with('~') {
        return Err(invalid("home-relative paths are not expanded"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid("parent directory segments are not allowed"));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| CritterError::Io {
                context: "resolving current directory".to_string(),
                source,
            })?
            .join(path)
    };

    // Rebuilding from components collapses `//`, `/./` and trailing slashes.
    Ok(absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}
