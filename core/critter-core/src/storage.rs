//! Path management for critter data under `~/.critter/`.
//!
//! Production code uses [`StorageConfig::from_home`]; tests inject a temporary
//! root with [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

use crate::error::{CritterError, Result};

#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// `~/.critter`. Fails only when the home directory cannot be resolved.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(CritterError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(".critter"),
        })
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Persisted pet snapshot.
    pub fn save_file(&self) -> PathBuf {
        self.root.join("save.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Daily rolling daemon logs.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| CritterError::Io {
            context: format!("creating {}", self.root.display()),
            source,
        })
    }
}
