//! PetEngine - the lifecycle state machine.
//!
//! Two orthogonal axes:
//!
//! ```text
//! growth:    EGG --(xp >= 200)--> LARVA --(xp >= 200)--> BEAST
//! vitality:  ALIVE --(health = 0)--> GHOST --(commit)--> ALIVE (back at EGG)
//! ```
//!
//! Every mutation goes through one of the operations below, each of which is
//! synchronous and leaves the vitals clamped. Stage and mood are never stored;
//! they are derived from health and evolution level on every read.

use chrono::{DateTime, Utc};
use critter_protocol::{from_ms, PetSnapshot};
use serde_json::Value;

use crate::decay::{decay, hours_since};
use crate::snapshot::{sanitize_snapshot, LoadReport};
use crate::vitals::{
    clamp_experience, clamp_health, stage_for, Mood, PetVitals, Stage, EVOLUTION_THRESHOLD,
    MAX_EVOLUTION_LEVEL,
};

pub const FEED_HEALTH: i64 = 20;
pub const FEED_EXPERIENCE: i64 = 15;
pub const REVIVAL_HEALTH: u8 = 50;
pub const RESURRECT_REVIVAL_HEALTH: u8 = 75;
/// Commit messages containing this (any case) revive with extra health.
pub const RESURRECT_KEYWORD: &str = "resurrect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthOutcome {
    pub previous: u8,
    pub health: u8,
    /// Health went from positive to zero on this call.
    pub died: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperienceOutcome {
    pub experience: u32,
    pub evolved_to: Option<Stage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Fed {
        health: u8,
        evolved_to: Option<Stage>,
    },
    Revived {
        health: u8,
        death_count: u32,
    },
}

impl FeedOutcome {
    pub fn is_revival(&self) -> bool {
        matches!(self, FeedOutcome::Revived { .. })
    }
}

/// Revival health for a commit message.
pub fn revival_health(message: &str) -> u8 {
    if message.to_lowercase().contains(RESURRECT_KEYWORD) {
        RESURRECT_REVIVAL_HEALTH
    } else {
        REVIVAL_HEALTH
    }
}

/// Owns the pet's vitals. Not thread-safe; the host serializes access.
#[derive(Debug, Clone, Default)]
pub struct PetEngine {
    vitals: PetVitals,
}

impl PetEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vitals(&self) -> &PetVitals {
        &self.vitals
    }

    pub fn stage(&self) -> Stage {
        self.vitals.stage()
    }

    pub fn mood(&self) -> Mood {
        self.vitals.mood()
    }

    pub fn is_alive(&self) -> bool {
        self.vitals.is_alive()
    }

    /// Adds (or subtracts) health. Dropping to zero clears growth progress.
    pub fn apply_health_delta(&mut self, amount: i64) -> HealthOutcome {
        let previous = self.vitals.health;
        let health = clamp_health((previous as i64).saturating_add(amount));
        self.vitals.health = health;

        let died = previous > 0 && health == 0;
        if died {
            self.vitals.experience = 0;
            self.vitals.evolution_level = 0;
            tracing::info!(
                previous,
                death_count = self.vitals.death_count,
                "Pet died"
            );
        }

        HealthOutcome {
            previous,
            health,
            died,
        }
    }

    /// Adds experience, evolving at most one level per call.
    pub fn apply_experience_delta(&mut self, amount: i64) -> ExperienceOutcome {
        let experience = clamp_experience((self.vitals.experience as i64).saturating_add(amount));

        if experience >= EVOLUTION_THRESHOLD && self.vitals.evolution_level < MAX_EVOLUTION_LEVEL {
            let from = self.stage();
            self.vitals.experience = 0;
            self.vitals.evolution_level += 1;
            let to = stage_for(self.vitals.evolution_level, self.vitals.health);
            tracing::info!(from = %from, to = %to, "Pet evolved");
            return ExperienceOutcome {
                experience: 0,
                evolved_to: Some(to),
            };
        }

        self.vitals.experience = experience;
        ExperienceOutcome {
            experience,
            evolved_to: None,
        }
    }

    /// Feeds the pet from a commit, or revives it if it is a ghost.
    pub fn feed_from_commit(&mut self, hash: &str, message: &str, timestamp_ms: i64) -> FeedOutcome {
        let committed_at = from_ms(timestamp_ms).unwrap_or_else(|| {
            tracing::warn!(timestamp_ms, "Commit timestamp out of range; using now");
            Utc::now()
        });

        let outcome = if self.vitals.health == 0 {
            let health = revival_health(message);
            self.vitals.health = health;
            self.vitals.experience = 0;
            self.vitals.evolution_level = 0;
            self.vitals.death_count = self.vitals.death_count.saturating_add(1);
            tracing::info!(
                health,
                death_count = self.vitals.death_count,
                "Pet revived by commit"
            );
            FeedOutcome::Revived {
                health,
                death_count: self.vitals.death_count,
            }
        } else {
            let health = self.apply_health_delta(FEED_HEALTH).health;
            let evolved_to = self.apply_experience_delta(FEED_EXPERIENCE).evolved_to;
            FeedOutcome::Fed { health, evolved_to }
        };

        self.vitals.last_commit_hash = Some(hash.to_string());
        self.vitals.last_commit_at = Some(committed_at);
        self.vitals.decay_charged = 0;
        outcome
    }

    /// Applies the tiered decay for `hours_since_commit` through the health path.
    pub fn apply_time_decay(&mut self, hours_since_commit: f64) -> HealthOutcome {
        let amount = decay(hours_since_commit);
        if amount == 0 {
            let health = self.vitals.health;
            return HealthOutcome {
                previous: health,
                health,
                died: false,
            };
        }
        tracing::debug!(hours = hours_since_commit, amount, "Applying time decay");
        self.apply_health_delta(-(amount as i64))
    }

    /// Catch-up decay for the time since the last recorded commit.
    ///
    /// Only the part of the tier not already charged for this gap is
    /// subtracted, so restarting repeatedly inside one tier costs nothing
    /// extra.
    pub fn catch_up(&mut self, now: DateTime<Utc>) -> HealthOutcome {
        let hours = hours_since(self.vitals.last_commit_at, now);
        let due = decay(hours);
        let owed = due.saturating_sub(self.vitals.decay_charged);
        self.vitals.decay_charged = self.vitals.decay_charged.max(due);
        if owed == 0 {
            let health = self.vitals.health;
            return HealthOutcome {
                previous: health,
                health,
                died: false,
            };
        }
        tracing::debug!(hours, due, owed, "Applying catch-up decay");
        self.apply_health_delta(-(owed as i64))
    }

    /// Returns every field to its initial value.
    pub fn reset(&mut self) {
        self.vitals = PetVitals::default();
    }

    /// Restores vitals from an untrusted persisted value, field by field.
    pub fn load_from_persisted(&mut self, data: &Value) -> LoadReport {
        let (vitals, report) = sanitize_snapshot(data);
        self.vitals = vitals;
        report
    }

    pub fn snapshot(&self, watched_path: Option<String>) -> PetSnapshot {
        PetSnapshot {
            health: self.vitals.health,
            experience: self.vitals.experience,
            evolution_level: self.vitals.evolution_level,
            stage: self.vitals.stage(),
            mood: self.vitals.mood(),
            death_count: self.vitals.death_count,
            last_commit_timestamp: self.vitals.last_commit_at.map(|at| at.timestamp_millis()),
            last_commit_hash: self.vitals.last_commit_hash.clone(),
            decay_charged: self.vitals.decay_charged,
            watched_path,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_vitals(vitals: PetVitals) -> Self {
        Self { vitals }
    }
}
