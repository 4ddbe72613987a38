//! Event and message types shared by critter-daemon and its clients.
//!
//! This crate is the single definition of everything that crosses the boundary
//! between the daemon and a UI process: activity events produced by the
//! monitors, the persisted pet snapshot, activity log entries, and the small set
//! of inbound messages a client may send. The daemon remains the authority on
//! validation, but clients can reuse the same types to build valid messages.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_HISTORY_LIMIT: usize = 50;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pet Stage / Mood
// ═══════════════════════════════════════════════════════════════════════════════

/// Growth phase of the creature. `Ghost` overrides everything while health is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Egg,
    Larva,
    Beast,
    Ghost,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Egg => "EGG",
            Stage::Larva => "LARVA",
            Stage::Beast => "BEAST",
            Stage::Ghost => "GHOST",
        }
    }

    /// Parses the persisted spelling. Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "EGG" => Some(Stage::Egg),
            "LARVA" => Some(Stage::Larva),
            "BEAST" => Some(Stage::Beast),
            "GHOST" => Some(Stage::Ghost),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse emotional indicator derived from health alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    Happy,
    Hungry,
    Dead,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "HAPPY",
            Mood::Hungry => "HUNGRY",
            Mood::Dead => "DEAD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HAPPY" => Some(Mood::Happy),
            "HUNGRY" => Some(Mood::Hungry),
            "DEAD" => Some(Mood::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshots
// ═══════════════════════════════════════════════════════════════════════════════

/// Plain data view of the pet, as written to and read from persistence.
///
/// `stage` and `mood` are derived values included for display consumers; the
/// engine recomputes them on load rather than trusting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetSnapshot {
    pub health: u8,
    pub experience: u32,
    pub evolution_level: u8,
    pub stage: Stage,
    pub mood: Mood,
    pub death_count: u32,
    pub last_commit_timestamp: Option<i64>,
    pub last_commit_hash: Option<String>,
    /// Catch-up decay already charged since the last commit.
    #[serde(default)]
    pub decay_charged: u32,
    pub watched_path: Option<String>,
}

/// A client-supplied subset of [`PetSnapshot`] fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialSnapshot {
    pub health: Option<u8>,
    pub experience: Option<u32>,
    pub evolution_level: Option<u8>,
    pub stage: Option<Stage>,
    pub mood: Option<Mood>,
    pub death_count: Option<u32>,
    pub last_commit_timestamp: Option<i64>,
    pub last_commit_hash: Option<String>,
    pub watched_path: Option<String>,
}

impl PartialSnapshot {
    /// True when the request touches fields owned by the lifecycle engine.
    pub fn touches_vitals(&self) -> bool {
        self.health.is_some()
            || self.experience.is_some()
            || self.evolution_level.is_some()
            || self.stage.is_some()
            || self.mood.is_some()
            || self.death_count.is_some()
            || self.last_commit_timestamp.is_some()
            || self.last_commit_hash.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Activity Events (monitor output)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    FileChanged,
    FileAdded,
    Commit,
}

/// A discrete, immutable event produced by the filesystem monitor or the
/// commit poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    /// File path for file events, commit subject line for commits.
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ActivityEvent {
    pub fn file_changed(path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: ActivityKind::FileChanged,
            subject: path.into(),
            hash: None,
            timestamp,
        }
    }

    pub fn file_added(path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: ActivityKind::FileAdded,
            subject: path.into(),
            hash: None,
            timestamp,
        }
    }

    pub fn commit(hash: impl Into<String>, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: ActivityKind::Commit,
            subject: message.into(),
            hash: Some(hash.into()),
            timestamp,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self.kind {
            ActivityKind::FileChanged | ActivityKind::FileAdded => {
                if self.subject.trim().is_empty() {
                    return Err(ErrorInfo::new("invalid_path", "file events require a path"));
                }
            }
            ActivityKind::Commit => {
                let Some(hash) = self.hash.as_deref() else {
                    return Err(ErrorInfo::new("invalid_hash", "commit events require a hash"));
                };
                if !is_commit_hash(hash) {
                    return Err(ErrorInfo::new(
                        "invalid_hash",
                        format!("commit hash is not a hex object id: {}", hash),
                    ));
                }
            }
        }
        if self.timestamp < 0 {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "timestamp must not precede the Unix epoch",
            ));
        }
        Ok(())
    }

    pub fn to_outbound(&self) -> OutboundEvent {
        match self.kind {
            ActivityKind::FileChanged => OutboundEvent::FileChanged {
                path: self.subject.clone(),
                timestamp: self.timestamp,
            },
            ActivityKind::FileAdded => OutboundEvent::FileAdded {
                path: self.subject.clone(),
                timestamp: self.timestamp,
            },
            ActivityKind::Commit => OutboundEvent::Commit {
                hash: self.hash.clone().unwrap_or_default(),
                message: self.subject.clone(),
                timestamp: self.timestamp,
            },
        }
    }
}

/// Accepts abbreviated (>= 4) through SHA-256 length (64) hex object ids.
pub fn is_commit_hash(value: &str) -> bool {
    (4..=64).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Activity Log Entries
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogKind {
    Feed,
    Resurrect,
}

/// Whether an entry was observed live or imported from git history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogOrigin {
    #[default]
    Live,
    History,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub kind: LogKind,
    pub text: String,
    pub timestamp: i64,
    #[serde(default)]
    pub origin: LogOrigin,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Save File
// ═══════════════════════════════════════════════════════════════════════════════

/// What the daemon writes to disk: the snapshot fields at the top level plus
/// the activity log. Readers must not trust it; it is sanitized on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    pub version: u32,
    #[serde(flatten)]
    pub snapshot: PetSnapshot,
    #[serde(default)]
    pub activity_log: Vec<LogEntry>,
}

impl SaveData {
    pub fn new(snapshot: PetSnapshot, activity_log: Vec<LogEntry>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            snapshot,
            activity_log,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Outbound / Inbound Messages
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    FileChanged {
        path: String,
        timestamp: i64,
    },
    FileAdded {
        path: String,
        timestamp: i64,
    },
    Commit {
        hash: String,
        message: String,
        timestamp: i64,
    },
    Vitals {
        snapshot: PetSnapshot,
    },
    LogEntry {
        entry: LogEntry,
    },
    Error {
        error: ErrorInfo,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::FileChanged { .. } => "file-changed",
            OutboundEvent::FileAdded { .. } => "file-added",
            OutboundEvent::Commit { .. } => "commit",
            OutboundEvent::Vitals { .. } => "vitals",
            OutboundEvent::LogEntry { .. } => "log-entry",
            OutboundEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    SaveRequested {
        #[serde(default)]
        snapshot: PartialSnapshot,
    },
    HistoryRequested {
        #[serde(default)]
        limit: Option<usize>,
    },
}

/// Parses and validates a single inbound message (one NDJSON line).
pub fn parse_inbound(line: &str) -> Result<InboundMessage, ErrorInfo> {
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(ErrorInfo::new(
            "message_too_large",
            "message exceeded maximum size",
        ));
    }
    if line.trim().is_empty() {
        return Err(ErrorInfo::new("empty_message", "message body was empty"));
    }

    let message: InboundMessage = serde_json::from_str(line).map_err(|err| {
        ErrorInfo::new(
            "invalid_message",
            format!("message was not a recognized JSON message: {}", err),
        )
    })?;

    match &message {
        InboundMessage::SaveRequested { snapshot } => {
            if let Some(path) = snapshot.watched_path.as_deref() {
                if path.trim().is_empty() {
                    return Err(ErrorInfo::new(
                        "invalid_watched_path",
                        "watchedPath must not be empty",
                    ));
                }
            }
        }
        InboundMessage::HistoryRequested { limit } => {
            if matches!(limit, Some(0)) {
                return Err(ErrorInfo::new("invalid_limit", "limit must be positive"));
            }
        }
    }

    Ok(message)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Time helpers
// ═══════════════════════════════════════════════════════════════════════════════

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_ms(timestamp: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_events_are_tagged_with_kebab_case_type() {
        let event = ActivityEvent::file_added("/repo/src/main.rs", 1_700_000_000_000).to_outbound();
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "file-added");
        assert_eq!(value["path"], "/repo/src/main.rs");
        assert_eq!(event.name(), "file-added");
    }

    #[test]
    fn commit_event_carries_hash_message_and_timestamp() {
        let event = ActivityEvent::commit("abc1234", "fix bug", 42).to_outbound();
        assert_eq!(
            event,
            OutboundEvent::Commit {
                hash: "abc1234".to_string(),
                message: "fix bug".to_string(),
                timestamp: 42,
            }
        );
    }

    #[test]
    fn validate_rejects_non_hex_hash() {
        let event = ActivityEvent::commit("not-a-hash", "msg", 1);
        let err = event.validate().expect_err("invalid");
        assert_eq!(err.code, "invalid_hash");
    }

    #[test]
    fn validate_rejects_empty_file_path() {
        let event = ActivityEvent::file_changed("  ", 1);
        assert_eq!(event.validate().expect_err("invalid").code, "invalid_path");
    }

    #[test]
    fn snapshot_uses_camel_case_and_screaming_enums() {
        let snapshot = PetSnapshot {
            health: 80,
            experience: 15,
            evolution_level: 1,
            stage: Stage::Larva,
            mood: Mood::Happy,
            death_count: 2,
            last_commit_timestamp: Some(1_000),
            last_commit_hash: Some("abcd".to_string()),
            decay_charged: 0,
            watched_path: None,
        };
        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(value["evolutionLevel"], 1);
        assert_eq!(value["stage"], "LARVA");
        assert_eq!(value["mood"], "HAPPY");
        assert_eq!(value["lastCommitTimestamp"], 1_000);
    }

    #[test]
    fn save_data_flattens_snapshot_beside_version_and_log() {
        let snapshot = PetSnapshot {
            health: 55,
            experience: 0,
            evolution_level: 0,
            stage: Stage::Egg,
            mood: Mood::Hungry,
            death_count: 0,
            last_commit_timestamp: None,
            last_commit_hash: None,
            decay_charged: 0,
            watched_path: Some("/repo".to_string()),
        };
        let entry = LogEntry {
            id: "01J0000000000000000000000".to_string(),
            kind: LogKind::Feed,
            text: "fix parser".to_string(),
            timestamp: 7,
            origin: LogOrigin::Live,
        };
        let value =
            serde_json::to_value(SaveData::new(snapshot, vec![entry])).expect("serialize");
        assert_eq!(value["version"], PROTOCOL_VERSION);
        assert_eq!(value["health"], 55);
        assert_eq!(value["watchedPath"], "/repo");
        assert_eq!(value["activityLog"][0]["text"], "fix parser");
        assert_eq!(value["activityLog"][0]["kind"], "feed");
    }

    #[test]
    fn parse_inbound_accepts_save_request_with_partial_snapshot() {
        let message =
            parse_inbound(r#"{"type":"save-requested","snapshot":{"watchedPath":"/repo"}}"#)
                .expect("parse");
        match message {
            InboundMessage::SaveRequested { snapshot } => {
                assert_eq!(snapshot.watched_path.as_deref(), Some("/repo"));
                assert!(!snapshot.touches_vitals());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parse_inbound_rejects_unknown_type() {
        let err = parse_inbound(r#"{"type":"feed-me"}"#).expect_err("unknown");
        assert_eq!(err.code, "invalid_message");
    }

    #[test]
    fn parse_inbound_rejects_empty_and_zero_limit() {
        assert_eq!(parse_inbound("   ").expect_err("empty").code, "empty_message");
        let err = parse_inbound(r#"{"type":"history-requested","limit":0}"#).expect_err("zero");
        assert_eq!(err.code, "invalid_limit");
    }

    #[test]
    fn stage_and_mood_parse_only_known_spellings() {
        assert_eq!(Stage::parse("BEAST"), Some(Stage::Beast));
        assert_eq!(Stage::parse("beast"), None);
        assert_eq!(Mood::parse("DEAD"), Some(Mood::Dead));
        assert_eq!(Mood::parse("SLEEPY"), None);
    }
}
