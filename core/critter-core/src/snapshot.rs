//! Sanitizing restore of persisted pet state.
//!
//! The persisted payload is untrusted: it may be hand-edited, written by an
//! older build, or partially corrupted. Every field is validated on its own and
//! replaced with its default when unusable, so one bad field never discards the
//! rest of the save. Stage and mood are checked against their known spellings
//! but never trusted; the values derived from health and evolution level win.

use chrono::{DateTime, Utc};
use critter_protocol::{from_ms, is_commit_hash, Mood, Stage};
use serde_json::{Map, Value};

use crate::vitals::{
    clamp_experience, clamp_health, level_for_stage, PetVitals, MAX_EVOLUTION_LEVEL, MAX_HEALTH,
};

/// What a restore produced besides the vitals themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub watched_path: Option<String>,
    /// Human-readable notes for each field that was defaulted or adjusted.
    pub corrections: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }
}

enum NumberField {
    Missing,
    Invalid,
    Value(f64),
}

fn read_number(object: &Map<String, Value>, keys: &[&str]) -> NumberField {
    let Some(value) = keys.iter().find_map(|key| object.get(*key)) else {
        return NumberField::Missing;
    };
    match value {
        Value::Null => NumberField::Missing,
        Value::Number(number) => match number.as_f64() {
            Some(value) if value.is_finite() => NumberField::Value(value),
            _ => NumberField::Invalid,
        },
        _ => NumberField::Invalid,
    }
}

fn read_string<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn read_timestamp(object: &Map<String, Value>, report: &mut LoadReport) -> Option<DateTime<Utc>> {
    let value = ["lastCommitTimestamp", "lastCommitDate"]
        .iter()
        .find_map(|key| object.get(*key))?;

    let parsed = match value {
        Value::Null => return None,
        Value::Number(number) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .and_then(|value| from_ms(value.trunc() as i64)),
        Value::String(text) if text.trim().is_empty() => return None,
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        _ => None,
    };

    if parsed.is_none() {
        report
            .corrections
            .push("lastCommitTimestamp unreadable; treated as no commit".to_string());
    }
    parsed
}

/// Builds vitals from an untrusted persisted value. Never fails.
pub fn sanitize_snapshot(data: &Value) -> (PetVitals, LoadReport) {
    let mut report = LoadReport::default();

    let Some(object) = data.as_object() else {
        report
            .corrections
            .push("payload is not an object; using defaults".to_string());
        return (PetVitals::default(), report);
    };

    let health = match read_number(object, &["health"]) {
        NumberField::Value(value) => {
            let clamped = clamp_health(value.trunc() as i64);
            if clamped as f64 != value {
                report
                    .corrections
                    .push(format!("health {} adjusted to {}", value, clamped));
            }
            clamped
        }
        NumberField::Missing => {
            report.corrections.push("health missing".to_string());
            MAX_HEALTH
        }
        NumberField::Invalid => {
            report.corrections.push("health not a number".to_string());
            MAX_HEALTH
        }
    };

    let mut experience = match read_number(object, &["experience", "xp"]) {
        NumberField::Value(value) => {
            let clamped = clamp_experience(value.trunc() as i64);
            if clamped as f64 != value {
                report
                    .corrections
                    .push(format!("experience {} adjusted to {}", value, clamped));
            }
            clamped
        }
        NumberField::Missing => 0,
        NumberField::Invalid => {
            report.corrections.push("experience not a number".to_string());
            0
        }
    };

    let stored_stage = match object.get("stage") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = value.as_str().and_then(Stage::parse);
            if parsed.is_none() {
                report
                    .corrections
                    .push(format!("unknown stage {}; using EGG", value));
            }
            Some(parsed.unwrap_or(Stage::Egg))
        }
    };

    let stored_mood = match object.get("mood") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = value.as_str().and_then(Mood::parse);
            if parsed.is_none() {
                report
                    .corrections
                    .push(format!("unknown mood {}; using HAPPY", value));
            }
            Some(parsed.unwrap_or(Mood::Happy))
        }
    };

    let mut evolution_level = match read_number(object, &["evolutionLevel"]) {
        NumberField::Value(value) => {
            let clamped = value.trunc().clamp(0.0, MAX_EVOLUTION_LEVEL as f64) as u8;
            if clamped as f64 != value {
                report
                    .corrections
                    .push(format!("evolutionLevel {} adjusted to {}", value, clamped));
            }
            clamped
        }
        NumberField::Missing => stored_stage.and_then(level_for_stage).unwrap_or(0),
        NumberField::Invalid => {
            report
                .corrections
                .push("evolutionLevel not a number".to_string());
            0
        }
    };

    let death_count = match read_number(object, &["deathCount"]) {
        NumberField::Value(value) => {
            let clamped = value.trunc().clamp(0.0, u32::MAX as f64) as u32;
            if clamped as f64 != value {
                report
                    .corrections
                    .push(format!("deathCount {} adjusted to {}", value, clamped));
            }
            clamped
        }
        NumberField::Missing => 0,
        NumberField::Invalid => {
            report.corrections.push("deathCount not a number".to_string());
            0
        }
    };

    if health == 0 && (experience != 0 || evolution_level != 0) {
        report
            .corrections
            .push("dead pet carried growth progress; cleared".to_string());
        experience = 0;
        evolution_level = 0;
    }

    let last_commit_at = read_timestamp(object, &mut report);

    let decay_charged = match read_number(object, &["decayCharged"]) {
        NumberField::Value(value) => value.trunc().clamp(0.0, u32::MAX as f64) as u32,
        NumberField::Missing => 0,
        NumberField::Invalid => {
            report.corrections.push("decayCharged not a number".to_string());
            0
        }
    };

    let last_commit_hash = match read_string(object, &["lastCommitHash"]) {
        Some(hash) if is_commit_hash(hash) => Some(hash.to_string()),
        Some(hash) => {
            report
                .corrections
                .push(format!("lastCommitHash {:?} is not a commit id; dropped", hash));
            None
        }
        None => None,
    };

    report.watched_path =
        read_string(object, &["watchedPath", "watchedProjectPath"]).map(str::to_string);

    let vitals = PetVitals {
        health,
        experience,
        evolution_level,
        death_count,
        last_commit_at,
        last_commit_hash,
        decay_charged,
    };

    if let Some(stage) = stored_stage {
        if stage != vitals.stage() {
            tracing::warn!(
                stored = %stage,
                derived = %vitals.stage(),
                "Persisted stage disagrees with vitals; using derived stage"
            );
        }
    }
    if let Some(mood) = stored_mood {
        if mood != vitals.mood() {
            tracing::warn!(
                stored = %mood,
                derived = %vitals.mood(),
                "Persisted mood disagrees with vitals; using derived mood"
            );
        }
    }

    (vitals, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn restores_a_clean_snapshot() {
        let (vitals, report) = sanitize_snapshot(&json!({
            "health": 80,
            "experience": 45,
            "evolutionLevel": 1,
            "stage": "LARVA",
            "mood": "HAPPY",
            "deathCount": 3,
            "lastCommitTimestamp": 1_700_000_000_000i64,
            "lastCommitHash": "0123abcd",
            "watchedPath": "/home/dev/repo"
        }));

        assert!(report.is_clean(), "corrections: {:?}", report.corrections);
        assert_eq!(vitals.health(), 80);
        assert_eq!(vitals.experience(), 45);
        assert_eq!(vitals.evolution_level(), 1);
        assert_eq!(vitals.death_count(), 3);
        assert_eq!(
            vitals.last_commit_at().map(|at| at.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(vitals.last_commit_hash(), Some("0123abcd"));
        assert_eq!(report.watched_path.as_deref(), Some("/home/dev/repo"));
    }

    #[test]
    fn out_of_range_numbers_are_clamped() {
        let (vitals, report) = sanitize_snapshot(&json!({
            "health": 250,
            "experience": -40,
            "evolutionLevel": 9,
            "deathCount": -2
        }));
        assert_eq!(vitals.health(), 100);
        assert_eq!(vitals.experience(), 0);
        assert_eq!(vitals.evolution_level(), 2);
        assert_eq!(vitals.death_count(), 0);
        assert_eq!(report.corrections.len(), 4);
    }

    #[test]
    fn non_numeric_fields_fall_back_to_defaults() {
        let (vitals, _) = sanitize_snapshot(&json!({
            "health": "NaN",
            "experience": {"a": 1},
            "evolutionLevel": true,
            "deathCount": [1]
        }));
        assert_eq!(vitals, PetVitals::default());
    }

    #[test]
    fn unknown_enums_are_reported_and_derived_values_win() {
        let (vitals, report) = sanitize_snapshot(&json!({
            "health": 30,
            "evolutionLevel": 2,
            "stage": "DRAGON",
            "mood": "ECSTATIC"
        }));
        assert_eq!(vitals.stage(), Stage::Beast);
        assert_eq!(vitals.mood(), Mood::Hungry);
        assert_eq!(report.corrections.len(), 2);
    }

    #[test]
    fn evolution_level_inferred_from_stage_when_missing() {
        let (vitals, _) = sanitize_snapshot(&json!({"health": 90, "stage": "LARVA"}));
        assert_eq!(vitals.evolution_level(), 1);
    }

    #[test]
    fn legacy_keys_are_honoured() {
        let (vitals, report) = sanitize_snapshot(&json!({
            "health": 60,
            "xp": 120,
            "lastCommitDate": "2025-03-01T12:00:00Z",
            "watchedProjectPath": "/work/legacy"
        }));
        assert_eq!(vitals.experience(), 120);
        assert_eq!(
            vitals.last_commit_at().map(|at| at.to_rfc3339()),
            Some("2025-03-01T12:00:00+00:00".to_string())
        );
        assert_eq!(report.watched_path.as_deref(), Some("/work/legacy"));
    }

    #[test]
    fn dead_pet_cannot_keep_growth() {
        let (vitals, _) = sanitize_snapshot(&json!({
            "health": 0,
            "experience": 150,
            "evolutionLevel": 2
        }));
        assert_eq!(vitals.experience(), 0);
        assert_eq!(vitals.evolution_level(), 0);
        assert_eq!(vitals.stage(), Stage::Ghost);
    }

    #[test]
    fn empty_and_invalid_strings_become_absent() {
        let (vitals, report) = sanitize_snapshot(&json!({
            "health": 100,
            "lastCommitHash": "zz-top",
            "lastCommitDate": "yesterday",
            "watchedPath": "   "
        }));
        assert_eq!(vitals.last_commit_hash(), None);
        assert_eq!(vitals.last_commit_at(), None);
        assert_eq!(report.watched_path, None);
        assert_eq!(report.corrections.len(), 2);
    }

    #[test]
    fn non_object_payload_resets_to_defaults() {
        for payload in [json!(null), json!([1, 2]), json!("save"), json!(42)] {
            let (vitals, report) = sanitize_snapshot(&payload);
            assert_eq!(vitals, PetVitals::default());
            assert!(!report.is_clean());
        }
    }

    #[test]
    fn fractional_numbers_are_truncated() {
        let (vitals, _) = sanitize_snapshot(&json!({"health": 55.9, "experience": 12.7}));
        assert_eq!(vitals.health(), 55);
        assert_eq!(vitals.experience(), 12);
    }
}
