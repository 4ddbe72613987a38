//! The single consumer that owns the engine.
//!
//! The monitor, the poller and the stdin reader only send [`HostMessage`]s; the
//! host drains them one at a time, so engine mutations never overlap. Commits
//! are the only activity that touches vitals. File events are forwarded to
//! listeners and nothing else.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use chrono::Utc;
use critter_core::{entry_for_feed, ActivityLog, LoadReport, NewLogEntry, PetEngine, Result};
use critter_protocol::{
    ActivityEvent, ActivityKind, ErrorInfo, InboundMessage, LogEntry, OutboundEvent, SaveData,
    MAX_HISTORY_LIMIT,
};
use tracing::{debug, info, warn};

use crate::commit_poller::{validate_watch_path, CommitPoller};
use crate::fs_monitor::FsMonitor;
use crate::git::GitAdapter;
use crate::listeners::ListenerRegistry;
use crate::store::SnapshotStore;

/// Where monitors deliver their events.
pub type EventSink = Arc<dyn Fn(ActivityEvent) + Send + Sync>;

#[derive(Debug)]
pub enum HostMessage {
    Activity(ActivityEvent),
    Inbound(InboundMessage),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub watch_files: bool,
    pub import_history: bool,
    pub history_limit: usize,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            watch_files: true,
            import_history: false,
            history_limit: MAX_HISTORY_LIMIT,
        }
    }
}

pub struct Host<S: SnapshotStore, A: GitAdapter + 'static> {
    engine: PetEngine,
    log: ActivityLog,
    listeners: ListenerRegistry,
    store: S,
    poller: CommitPoller<A>,
    monitor: FsMonitor,
    watched_path: Option<String>,
    watch_root: Option<PathBuf>,
    history_limit: usize,
    tx: Sender<HostMessage>,
    rx: Receiver<HostMessage>,
}

impl<S: SnapshotStore, A: GitAdapter + 'static> Host<S, A> {
    pub fn new(store: S, poller: CommitPoller<A>, monitor: FsMonitor) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            engine: PetEngine::new(),
            log: ActivityLog::new(),
            listeners: ListenerRegistry::new(),
            store,
            poller,
            monitor,
            watched_path: None,
            watch_root: None,
            history_limit: MAX_HISTORY_LIMIT,
            tx,
            rx,
        }
    }

    pub fn sender(&self) -> Sender<HostMessage> {
        self.tx.clone()
    }

    pub fn sink(&self) -> EventSink {
        let tx = self.tx.clone();
        Arc::new(move |event: ActivityEvent| {
            let _ = tx.send(HostMessage::Activity(event));
        })
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    #[allow(dead_code)]
    pub fn engine(&self) -> &PetEngine {
        &self.engine
    }

    #[allow(dead_code)]
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Restores the engine and the activity log from the store. A missing or
    /// unreadable save leaves a fresh pet with an empty log.
    pub fn restore(&mut self) -> LoadReport {
        let Some(value) = self.store.load() else {
            info!("No saved pet; starting fresh");
            self.engine.reset();
            self.log.clear();
            return LoadReport::default();
        };

        let report = self.engine.load_from_persisted(&value);
        for correction in &report.corrections {
            warn!(correction = %correction, "Saved pet corrected on load");
        }
        let entries = self.log.load_from_persisted(&value);
        self.watched_path = report.watched_path.clone();
        info!(
            health = self.engine.vitals().health(),
            stage = %self.engine.stage(),
            entries,
            "Saved pet restored"
        );
        report
    }

    /// Applies catch-up decay, then starts the poller and (optionally) the
    /// filesystem monitor on `root`.
    pub fn start(&mut self, root: &Path, options: &StartOptions) -> Result<()> {
        let root = validate_watch_path(root)?;
        self.history_limit = options.history_limit.clamp(1, MAX_HISTORY_LIMIT);

        let outcome = self.engine.catch_up(Utc::now());
        if outcome.health != outcome.previous {
            info!(
                previous = outcome.previous,
                health = outcome.health,
                died = outcome.died,
                "Applied catch-up decay"
            );
        }
        self.watched_path = Some(root.to_string_lossy().into_owned());
        self.publish_vitals();
        self.persist();

        self.poller.set_last_known_hash(
            self.engine
                .vitals()
                .last_commit_hash()
                .map(str::to_string),
        );
        self.poller.start(&root, self.sink())?;

        if options.watch_files {
            if let Err(err) = self.monitor.start(&root, self.sink()) {
                warn!(error = %err, "Filesystem monitor unavailable; continuing without file events");
            }
        }

        info!(
            commits = self.poller.is_active(),
            files = self.monitor.is_active(),
            listeners = self.listeners.len(),
            "Host started"
        );
        self.watch_root = Some(root);
        if options.import_history {
            self.import_history(self.history_limit);
        }
        Ok(())
    }

    /// Drains messages until `Shutdown`.
    pub fn run(&mut self) {
        while let Ok(message) = self.rx.recv() {
            if !self.handle(message) {
                break;
            }
        }
        self.shutdown();
    }

    /// Handles one message. Returns false on shutdown.
    pub fn handle(&mut self, message: HostMessage) -> bool {
        match message {
            HostMessage::Activity(event) => self.handle_activity(event),
            HostMessage::Inbound(message) => self.handle_inbound(message),
            HostMessage::Shutdown => return false,
        }
        true
    }

    /// Stops both monitors and writes a final save. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.poller.stop();
        self.monitor.stop();
        if self.watch_root.take().is_some() {
            self.persist();
            info!("Host stopped");
        }
    }

    fn handle_activity(&mut self, event: ActivityEvent) {
        if let Err(error) = event.validate() {
            warn!(code = %error.code, message = %error.message, "Dropping invalid activity event");
            self.publish(OutboundEvent::Error { error });
            return;
        }

        self.publish(event.to_outbound());
        if event.kind != ActivityKind::Commit {
            return;
        }

        let hash = event.hash.clone().unwrap_or_default();
        let outcome = self
            .engine
            .feed_from_commit(&hash, &event.subject, event.timestamp);
        debug!(?outcome, "Commit fed to pet");

        let entry = self
            .log
            .append(entry_for_feed(&outcome, &event.subject, event.timestamp))
            .clone();
        self.publish(OutboundEvent::LogEntry { entry });
        self.publish_vitals();
        self.persist();
    }

    fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::SaveRequested { snapshot } => {
                if snapshot.touches_vitals() {
                    debug!("Ignoring client-supplied vitals; the engine owns them");
                }
                if let Some(path) = snapshot.watched_path {
                    info!(path = %path, "Watch path updated; takes effect on restart");
                    self.watched_path = Some(path);
                }
                self.persist();
            }
            InboundMessage::HistoryRequested { limit } => {
                self.import_history(limit.unwrap_or(self.history_limit));
            }
        }
    }

    fn import_history(&mut self, limit: usize) {
        let Some(root) = self.watch_root.clone() else {
            warn!("History requested before start");
            return;
        };
        let mut commits = self.poller.recent_commits(&root, limit);
        if commits.is_empty() {
            debug!("No history to import");
            return;
        }
        debug!(count = commits.len(), newest = %commits[0].hash, "Fetched commit history");
        // Newest first from git; the log wants oldest first.
        commits.reverse();

        let entries = commits
            .into_iter()
            .map(|commit| NewLogEntry::feed(commit.message, commit.timestamp_ms))
            .collect::<Vec<_>>();
        let kept = self.log.append_historical(entries);
        info!(kept, "Imported commit history");

        let imported: Vec<LogEntry> = self.log.entries().take(kept).cloned().collect();
        for entry in imported {
            self.publish(OutboundEvent::LogEntry { entry });
        }
        self.persist();
    }

    fn publish(&mut self, event: OutboundEvent) {
        self.listeners.publish(&event);
    }

    fn publish_vitals(&mut self) {
        let snapshot = self.engine.snapshot(self.watched_path.clone());
        self.publish(OutboundEvent::Vitals { snapshot });
    }

    fn persist(&mut self) {
        let data = SaveData::new(
            self.engine.snapshot(self.watched_path.clone()),
            self.log.entries().cloned().collect(),
        );
        if let Err(err) = self.store.save(&data) {
            warn!(error = %err, "Failed to save pet");
            self.publish(OutboundEvent::Error {
                error: ErrorInfo::new("save_failed", err.to_string()),
            });
        }
    }
}
