//! Daemon runtime configuration (`~/.critter/config.toml`).
//!
//! Every field is optional in the file. A missing file yields defaults; a file
//! that exists but fails to parse is an error, since silently ignoring a typo
//! would watch the wrong tree.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use critter_core::CritterError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub watch_path: Option<PathBuf>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_ref_debounce_ms")]
    pub ref_debounce_ms: u64,
    #[serde(default = "default_stability_threshold_ms")]
    pub stability_threshold_ms: u64,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
    #[serde(default)]
    pub extra_ignored: Vec<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub import_history_on_start: bool,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_ref_debounce_ms() -> u64 {
    500
}

fn default_stability_threshold_ms() -> u64 {
    100
}

fn default_git_timeout_secs() -> u64 {
    5
}

fn default_history_limit() -> usize {
    critter_protocol::MAX_HISTORY_LIMIT
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watch_path: None,
            poll_interval_secs: default_poll_interval_secs(),
            ref_debounce_ms: default_ref_debounce_ms(),
            stability_threshold_ms: default_stability_threshold_ms(),
            max_depth: None,
            git_timeout_secs: default_git_timeout_secs(),
            extra_ignored: Vec::new(),
            history_limit: default_history_limit(),
            import_history_on_start: false,
        }
    }
}

impl DaemonConfig {
    /// Zero intervals would spin; they are raised to the smallest sane value.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn ref_debounce(&self) -> Duration {
        Duration::from_millis(self.ref_debounce_ms.max(1))
    }

    pub fn stability_threshold(&self) -> Duration {
        Duration::from_millis(self.stability_threshold_ms.max(1))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs.max(1))
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
            .clamp(1, critter_protocol::MAX_HISTORY_LIMIT)
    }
}

pub fn load_config(path: &Path) -> Result<DaemonConfig, CritterError> {
    if !path.exists() {
        return Ok(DaemonConfig::default());
    }

    let content =
        fs_err::read_to_string(path).map_err(|source| CritterError::ConfigReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str::<DaemonConfig>(&content).map_err(|err| CritterError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = load_config(&temp_dir.path().join("config.toml")).expect("load config");
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.ref_debounce(), Duration::from_millis(500));
        assert_eq!(config.stability_threshold(), Duration::from_millis(100));
        assert_eq!(config.history_limit(), 50);
    }

    #[test]
    fn parses_partial_file_and_fills_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
watch_path = "/home/dev/project"
poll_interval_secs = 10
max_depth = 4
extra_ignored = ["coverage", ".idea"]
import_history_on_start = true
"#,
        )
        .expect("write config");

        let config = load_config(&path).expect("load config");
        assert_eq!(config.watch_path, Some(PathBuf::from("/home/dev/project")));
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.max_depth, Some(4));
        assert_eq!(config.extra_ignored, vec!["coverage", ".idea"]);
        assert!(config.import_history_on_start);
        assert_eq!(config.ref_debounce_ms, 500);
        assert_eq!(config.git_timeout_secs, 5);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "poll_interval_secs = \"soon\"\n").expect("write config");

        let err = load_config(&path).expect_err("malformed");
        assert!(matches!(err, CritterError::ConfigMalformed { .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "poll_interval = 10\n").expect("write config");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_values_are_raised() {
        let config = DaemonConfig {
            poll_interval_secs: 0,
            history_limit: 500,
            ..DaemonConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.history_limit(), 50);
    }
}
