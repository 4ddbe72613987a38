//! Error types for critter-core and the daemon built on it.
//!
//! Environmental failures (git timing out, a subtree we cannot watch) are
//! logged and swallowed where they happen. What reaches a caller as an `Err`
//! is either a startup problem or a usage bug.

use std::path::PathBuf;

/// All errors that can occur in critter operations.
#[derive(Debug, thiserror::Error)]
pub enum CritterError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration read failed: {path}: {source}")]
    ConfigReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Monitor Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid watch path: {path}: {reason}")]
    InvalidWatchPath { path: String, reason: String },

    #[error("Failed to watch {path}: {details}")]
    WatchFailed { path: PathBuf, details: String },

    #[error("Commit poller used before start()")]
    PollerNotStarted,

    #[error("Filesystem monitor used before start()")]
    MonitorNotStarted,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using CritterError.
pub type Result<T> = std::result::Result<T, CritterError>;

impl From<CritterError> for String {
    fn from(err: CritterError) -> String {
        err.to_string()
    }
}
