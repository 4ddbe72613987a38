//! Read-only access to a git work tree.
//!
//! Every query is bounded by a timeout. A git that is missing, slow, or
//! unhappy with the directory yields "no information" (`None` / empty), never
//! an error: the poller simply tries again on its next tick.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const FIELD_SEPARATOR: char = '\u{1f}';
const HEAD_FORMAT: &str = "--format=%H%x1f%s%x1f%at%x1f%an";
const HISTORY_FORMAT: &str = "--format=%H%x1f%s%x1f%at";
const WAIT_STEP: Duration = Duration::from_millis(20);

/// The commit HEAD currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub message: String,
    pub author_timestamp_ms: i64,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalCommit {
    pub hash: String,
    pub message: String,
    pub timestamp_ms: i64,
}

pub trait GitAdapter: Send + Sync {
    fn is_work_tree(&self, path: &Path) -> bool;
    fn head_commit(&self, path: &Path) -> Option<CommitRecord>;
    /// Newest first, at most `limit` entries.
    fn recent_commits(&self, path: &Path, limit: usize) -> Vec<HistoricalCommit>;
    /// Absolute path of the repository's git directory.
    fn git_dir(&self, path: &Path) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct CommandGitAdapter {
    timeout: Duration,
}

impl Default for CommandGitAdapter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl CommandGitAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, path: &Path, args: &[&str]) -> Option<String> {
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(path)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");
        let output = run_with_timeout(command, self.timeout);
        if output.is_none() {
            tracing::debug!(?args, "git query returned no information");
        }
        output
    }
}

/// Runs `command` and returns its stdout if it exits successfully within
/// `timeout`. Stdout is drained on a helper thread while we wait, so output
/// larger than the pipe buffer cannot stall the child.
fn run_with_timeout(mut command: Command, timeout: Duration) -> Option<String> {
    let mut child = match command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(error = %err, "Failed to spawn git");
            return None;
        }
    };

    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut buffer = Vec::new();
        stdout.read_to_end(&mut buffer).map(|_| buffer)
    });

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "git timed out");
                    return None;
                }
                thread::sleep(WAIT_STEP);
            }
            Err(err) => {
                tracing::debug!(error = %err, "Failed to wait for git");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    };

    let output = match reader.join() {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "Failed to read git output");
            return None;
        }
        Err(_) => {
            tracing::warn!("git output reader panicked");
            return None;
        }
    };
    if !status.success() {
        tracing::debug!(code = ?status.code(), "git exited unsuccessfully");
        return None;
    }
    Some(String::from_utf8_lossy(&output).into_owned())
}

impl GitAdapter for CommandGitAdapter {
    fn is_work_tree(&self, path: &Path) -> bool {
        self.run(path, &["rev-parse", "--is-inside-work-tree"])
            .map(|output| output.trim() == "true")
            .unwrap_or(false)
    }

    fn head_commit(&self, path: &Path) -> Option<CommitRecord> {
        let output = self.run(path, &["log", "-1", HEAD_FORMAT])?;
        parse_head_line(&output)
    }

    fn recent_commits(&self, path: &Path, limit: usize) -> Vec<HistoricalCommit> {
        if limit == 0 {
            return Vec::new();
        }
        let count = format!("-n{}", limit);
        self.run(path, &["log", &count, HISTORY_FORMAT])
            .map(|output| parse_history(&output))
            .unwrap_or_default()
    }

    fn git_dir(&self, path: &Path) -> Option<PathBuf> {
        let output = self.run(path, &["rev-parse", "--absolute-git-dir"])?;
        let dir = output.trim();
        if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        }
    }
}

fn parse_seconds_as_ms(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()?.checked_mul(1000)
}

/// Parses `%H<US>%s<US>%at<US>%an`. Returns `None` for an empty repository.
pub fn parse_head_line(output: &str) -> Option<CommitRecord> {
    let line = output.lines().find(|line| !line.trim().is_empty())?;
    let mut parts = line.split(FIELD_SEPARATOR);
    let hash = parts.next()?.trim();
    if hash.is_empty() {
        return None;
    }
    let message = parts.next().unwrap_or_default().trim();
    let author_timestamp_ms = parts.next().and_then(parse_seconds_as_ms)?;
    let author = parts.next().unwrap_or_default().trim();

    Some(CommitRecord {
        hash: hash.to_string(),
        message: message.to_string(),
        author_timestamp_ms,
        author: author.to_string(),
    })
}

/// Parses one `%H<US>%s<US>%at` record per line, skipping malformed lines.
pub fn parse_history(output: &str) -> Vec<HistoricalCommit> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(FIELD_SEPARATOR);
            let hash = parts.next()?.trim();
            if hash.is_empty() {
                return None;
            }
            let message = parts.next()?.trim();
            let timestamp_ms = parts.next().and_then(parse_seconds_as_ms)?;
            Some(HistoricalCommit {
                hash: hash.to_string(),
                message: message.to_string(),
                timestamp_ms,
            })
        })
        .collect()
}
