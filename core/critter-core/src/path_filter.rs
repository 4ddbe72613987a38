//! Ignored-subtree detection for filesystem activity.
//!
//! A path is ignored when one of its *segments* is a generated or VCS-internal
//! directory name. Matching is by whole segment only: `node_modules/x` is
//! ignored, `node_modules_backup/x` is not.

use once_cell::sync::Lazy;
use regex::Regex;

/// Directory names whose subtrees never produce activity events.
pub const IGNORED_DIRECTORIES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    ".next",
    "build",
    ".cache",
    "target",
    "__pycache__",
    ".turbo",
    "venv",
    ".venv",
    "vendor",
    ".output",
];

static DEFAULT_FILTER: Lazy<PathFilter> = Lazy::new(|| PathFilter::with_extra::<&str>(&[]));
static REPEATED_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").unwrap());

/// Segment matcher built from the default ignore list plus any extra names.
#[derive(Debug, Clone)]
pub struct PathFilter {
    pattern: Regex,
    names: Vec<String>,
}

impl PathFilter {
    /// Builds a filter from [`IGNORED_DIRECTORIES`] plus `extra` segment names.
    /// Empty names and names containing a separator are skipped.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        let mut names: Vec<String> = IGNORED_DIRECTORIES.iter().map(|s| s.to_string()).collect();
        for name in extra {
            let name = name.as_ref().trim();
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                continue;
            }
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }

        let alternatives = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!("(^|/)({})(/|$)", alternatives))
            .expect("escaped segment names always form a valid pattern");

        Self { pattern, names }
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.pattern.is_match(&normalize_separators(path))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        DEFAULT_FILTER.clone()
    }
}

/// Returns true if `path` lies under one of the default ignored directories.
pub fn is_ignored(path: &str) -> bool {
    DEFAULT_FILTER.is_ignored(path)
}

/// Converts `\` to `/` and collapses runs of separators.
pub fn normalize_separators(path: &str) -> String {
    let forward = path.replace('\\', "/");
    REPEATED_SEPARATORS.replace_all(&forward, "/").into_owned()
}
