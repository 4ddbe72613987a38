//! Bounded FIFO of feed and resurrect entries shown in the UI.

use std::collections::{HashSet, VecDeque};

use critter_protocol::{LogEntry, LogKind, LogOrigin};
use serde_json::{Map, Value};

use crate::engine::FeedOutcome;

pub const DEFAULT_CAPACITY: usize = 50;
pub const HISTORY_PREFIX: &str = "HISTORY: ";
pub const RESURRECT_PREFIX: &str = "Resurrected by: ";

/// An entry before the log assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub kind: LogKind,
    pub text: String,
    pub timestamp: i64,
}

impl NewLogEntry {
    pub fn feed(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: LogKind::Feed,
            text: text.into(),
            timestamp,
        }
    }
}

/// Builds the live entry for a commit the engine just processed.
pub fn entry_for_feed(outcome: &FeedOutcome, message: &str, timestamp: i64) -> NewLogEntry {
    match outcome {
        FeedOutcome::Fed { .. } => NewLogEntry {
            kind: LogKind::Feed,
            text: message.to_string(),
            timestamp,
        },
        FeedOutcome::Revived { .. } => NewLogEntry {
            kind: LogKind::Resurrect,
            text: format!("{}{}", RESURRECT_PREFIX, message),
            timestamp,
        },
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends at the back, evicting the oldest entries past capacity.
    pub fn append(&mut self, entry: NewLogEntry) -> &LogEntry {
        self.entries.push_back(LogEntry {
            id: ulid::Ulid::new().to_string(),
            kind: entry.kind,
            text: entry.text,
            timestamp: entry.timestamp,
            origin: LogOrigin::Live,
        });
        self.trim();
        // Non-empty: we just pushed and capacity is at least one.
        &self.entries[self.entries.len() - 1]
    }

    /// Prepends imported git history ahead of the live entries.
    ///
    /// `entries` is expected oldest first. The log is trimmed from the front
    /// afterwards, so an import larger than the free space drops its own
    /// oldest commits before any live entry. Returns how many imported
    /// entries were kept; they are the first entries of the log.
    pub fn append_historical(&mut self, entries: Vec<NewLogEntry>) -> usize {
        let imported = entries.len();
        for entry in entries.into_iter().rev() {
            let text = if entry.text.starts_with(HISTORY_PREFIX) {
                entry.text
            } else {
                format!("{}{}", HISTORY_PREFIX, entry.text)
            };
            self.entries.push_front(LogEntry {
                id: ulid::Ulid::new().to_string(),
                kind: entry.kind,
                text,
                timestamp: entry.timestamp,
                origin: LogOrigin::History,
            });
        }
        let before = self.entries.len();
        self.trim();
        imported.saturating_sub(before - self.entries.len())
    }

    /// Replaces the log with the `activityLog` array of a saved file.
    ///
    /// Entries are checked one at a time: unreadable ones are dropped, and a
    /// missing or repeated id gets a fresh one. Only the newest `capacity`
    /// entries are kept. Also reads the older `type`/`path` spelling.
    /// Returns the number restored.
    pub fn load_from_persisted(&mut self, data: &Value) -> usize {
        self.entries.clear();
        let Some(raw) = data.get("activityLog").and_then(Value::as_array) else {
            return 0;
        };

        let mut seen = HashSet::new();
        let mut restored: Vec<LogEntry> = raw
            .iter()
            .filter_map(|value| value.as_object().and_then(sanitize_entry))
            .map(|mut entry| {
                if entry.id.is_empty() || !seen.insert(entry.id.clone()) {
                    entry.id = ulid::Ulid::new().to_string();
                }
                entry
            })
            .collect();

        let dropped = raw.len() - restored.len();
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped unreadable activity log entries");
        }
        let overflow = restored.len().saturating_sub(self.capacity);
        if overflow > 0 {
            tracing::debug!(overflow, "Saved activity log exceeds capacity; keeping newest");
        }
        self.entries.extend(restored.drain(overflow..));
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

fn sanitize_entry(object: &Map<String, Value>) -> Option<LogEntry> {
    let field = |key: &str, legacy: &str| object.get(key).or_else(|| object.get(legacy));

    let kind = match field("kind", "type").and_then(Value::as_str)? {
        "feed" => LogKind::Feed,
        "resurrect" => LogKind::Resurrect,
        _ => return None,
    };
    let text = field("text", "path").and_then(Value::as_str)?.trim();
    if text.is_empty() {
        return None;
    }
    let timestamp = object.get("timestamp").and_then(|value| {
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|ms| ms.is_finite()).map(|ms| ms as i64))
    })?;
    if timestamp < 0 {
        return None;
    }
    let origin = match object.get("origin").and_then(Value::as_str) {
        Some("history") => LogOrigin::History,
        Some(_) => LogOrigin::Live,
        None if text.starts_with(HISTORY_PREFIX) => LogOrigin::History,
        None => LogOrigin::Live,
    };
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Some(LogEntry {
        id,
        kind,
        text: text.to_string(),
        timestamp,
        origin,
    })
}
