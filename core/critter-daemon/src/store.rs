//! Persistence seam for the pet snapshot and its activity log.
//!
//! The store hands back raw JSON; the engine and the activity log sanitize it
//! on load. A missing, oversized or unparseable file is "no save".

use fs_err as fs;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use critter_core::{CritterError, Result};
use critter_protocol::{SaveData, MAX_MESSAGE_BYTES};

pub const MAX_SAVE_BYTES: u64 = MAX_MESSAGE_BYTES as u64;

pub trait SnapshotStore: Send {
    fn load(&self) -> Option<Value>;
    fn save(&self, data: &SaveData) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Option<Value> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(error = %err, "Failed to stat save file");
                return None;
            }
        };
        if metadata.len() > MAX_SAVE_BYTES {
            warn!(
                bytes = metadata.len(),
                path = %self.path.display(),
                "Save file too large; ignoring"
            );
            return None;
        }

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "Failed to read save file");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "Save file is not valid JSON");
                None
            }
        }
    }

    fn save(&self, data: &SaveData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CritterError::Io {
                context: "creating save directory".to_string(),
                source,
            })?;
        }

        let payload = serde_json::to_vec_pretty(data).map_err(|source| CritterError::Json {
            context: "serializing save data".to_string(),
            source,
        })?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload).map_err(|source| CritterError::Io {
            context: "writing save file".to_string(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| CritterError::Io {
            context: "committing save file".to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critter_protocol::{LogEntry, LogKind, LogOrigin, Mood, PetSnapshot, Stage};

    fn save_data() -> SaveData {
        let snapshot = PetSnapshot {
            health: 64,
            experience: 30,
            evolution_level: 1,
            stage: Stage::Larva,
            mood: Mood::Happy,
            death_count: 2,
            last_commit_timestamp: Some(1_700_000_000_000),
            last_commit_hash: Some("abc1234".to_string()),
            decay_charged: 15,
            watched_path: Some("/repo".to_string()),
        };
        let entry = LogEntry {
            id: "01HZX3V6Q4M1D2E3F4G5H6J7K8".to_string(),
            kind: LogKind::Feed,
            text: "fix parser".to_string(),
            timestamp: 1_700_000_000_000,
            origin: LogOrigin::Live,
        };
        SaveData::new(snapshot, vec![entry])
    }

    #[test]
    fn missing_file_loads_as_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("save.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn save_writes_camel_case_json_atomically() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("nested").join("save.json"));
        store.save(&save_data()).expect("save");

        let value = store.load().expect("load");
        assert_eq!(value["health"], 64);
        assert_eq!(value["evolutionLevel"], 1);
        assert_eq!(value["stage"], "LARVA");
        assert_eq!(value["watchedPath"], "/repo");
        assert_eq!(value["version"], 1);
        assert_eq!(value["decayCharged"], 15);
        assert_eq!(value["activityLog"][0]["text"], "fix parser");
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("save.json");
        fs::write(&path, "{\"health\": 5,").expect("write");
        assert!(JsonFileStore::new(path).load().is_none());
    }

    #[test]
    fn oversized_file_loads_as_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("save.json");
        let padding = " ".repeat(MAX_SAVE_BYTES as usize + 1);
        fs::write(&path, format!("{{}}{}", padding)).expect("write");
        assert!(JsonFileStore::new(path).load().is_none());
    }
}
