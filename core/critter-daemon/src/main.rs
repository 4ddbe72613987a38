//! critter daemon entrypoint.
//!
//! Runs as a sidecar of the pet UI: watches one repository, feeds commits to
//! the lifecycle engine, and speaks newline-delimited JSON over stdio. The
//! process exits when stdin closes.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::thread;
use tracing::{error, info, warn};

use critter_core::{PathFilter, StorageConfig};

mod commit_poller;
mod config;
mod fs_monitor;
mod git;
mod host;
mod listeners;
mod logging;
mod store;
mod transport;

use commit_poller::{CommitPoller, PollerSettings};
use config::DaemonConfig;
use fs_monitor::{FsMonitor, MonitorSettings};
use git::CommandGitAdapter;
use host::{Host, StartOptions};
use store::JsonFileStore;

#[derive(Parser, Debug)]
#[command(name = "critter-daemon")]
#[command(about = "Watches a repository and keeps your coding pet alive")]
#[command(version)]
struct Cli {
    /// Repository or directory to watch (defaults to the saved path, then the current directory)
    #[arg(long, value_name = "PATH")]
    watch: Option<PathBuf>,

    /// Configuration file (default: ~/.critter/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between periodic HEAD checks
    #[arg(long, value_name = "SECS")]
    poll_interval_secs: Option<u64>,

    /// Disable filesystem events; commits are still detected
    #[arg(long)]
    no_fs: bool,

    /// Import recent commit history into the activity log on start
    #[arg(long)]
    history: bool,
}

impl Cli {
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(path) = &self.watch {
            config.watch_path = Some(path.clone());
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if self.history {
            config.import_history_on_start = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let storage = StorageConfig::from_home();
    let _logging_guard = logging::init(storage.as_ref().ok().map(|s| s.log_dir()).as_deref());

    let storage = match storage {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve critter data directory");
            std::process::exit(1);
        }
    };

    if let Err(err) = storage.ensure_root() {
        warn!(error = %err, "Failed to create critter data directory; saves may fail");
    }

    let config_path = cli.config.clone().unwrap_or_else(|| storage.config_file());
    let mut config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load config");
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    if let Err(err) = run(config, &storage, !cli.no_fs) {
        error!(error = %err, "critter-daemon failed to start");
        std::process::exit(1);
    }
}

fn run(config: DaemonConfig, storage: &StorageConfig, watch_files: bool) -> Result<(), String> {
    let store = JsonFileStore::new(storage.save_file());
    let save_path = store.path().to_path_buf();
    let poller = CommitPoller::new(
        CommandGitAdapter::new(config.git_timeout()),
        PollerSettings {
            poll_interval: config.poll_interval(),
            ref_debounce: config.ref_debounce(),
        },
    );
    let monitor = FsMonitor::new(MonitorSettings {
        stability_threshold: config.stability_threshold(),
        max_depth: config.max_depth,
        filter: PathFilter::with_extra(config.extra_ignored.as_slice()),
    });

    let mut host = Host::new(store, poller, monitor);
    let (_stdout_listener, outbound) = host.listeners_mut().subscribe();
    let writer = thread::spawn(move || transport::pump_outbound(outbound, io::stdout().lock()));

    let report = host.restore();
    let root = resolve_watch_root(config.watch_path.clone(), report.watched_path)?;
    info!(
        root = %root.display(),
        save = %save_path.display(),
        "critter-daemon starting"
    );

    host.start(
        &root,
        &StartOptions {
            watch_files,
            import_history: config.import_history_on_start,
            history_limit: config.history_limit(),
        },
    )?;

    let inbound = host.sender();
    thread::spawn(move || transport::pump_inbound(io::stdin().lock(), inbound));

    host.run();
    // Dropping the host closes the stdout listener so the writer drains and exits.
    drop(host);
    if writer.join().is_err() {
        warn!("stdout writer panicked");
    }
    Ok(())
}

/// Explicit path first, then the saved path if it still exists, then the
/// current directory.
fn resolve_watch_root(
    configured: Option<PathBuf>,
    persisted: Option<String>,
) -> Result<PathBuf, String> {
    if let Some(path) = configured {
        return Ok(path);
    }
    if let Some(path) = persisted.map(PathBuf::from) {
        if path.is_dir() {
            return Ok(path);
        }
        warn!(path = %path.display(), "Saved watch path no longer exists; using current directory");
    }
    std::env::current_dir().map_err(|err| format!("Failed to resolve current directory: {}", err))
}
