//! Vital statistics of the pet and the pure rules that derive stage and mood.

use chrono::{DateTime, Utc};
pub use critter_protocol::{Mood, Stage};

pub const MAX_HEALTH: u8 = 100;
pub const MAX_EVOLUTION_LEVEL: u8 = 2;
/// Experience needed to advance one evolution level.
pub const EVOLUTION_THRESHOLD: u32 = 200;
/// Health at or below this is `Hungry`.
pub const HUNGRY_AT_OR_BELOW: u8 = 50;

/// Source-of-truth fields. Stage and mood are not stored; see [`PetVitals::stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetVitals {
    pub(crate) health: u8,
    pub(crate) experience: u32,
    pub(crate) evolution_level: u8,
    pub(crate) death_count: u32,
    pub(crate) last_commit_at: Option<DateTime<Utc>>,
    pub(crate) last_commit_hash: Option<String>,
    /// Decay already subtracted for the gap since `last_commit_at`.
    pub(crate) decay_charged: u32,
}

impl Default for PetVitals {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            experience: 0,
            evolution_level: 0,
            death_count: 0,
            last_commit_at: None,
            last_commit_hash: None,
            decay_charged: 0,
        }
    }
}

impl PetVitals {
    pub fn health(&self) -> u8 {
        self.health
    }

    pub fn experience(&self) -> u32 {
        self.experience
    }

    pub fn evolution_level(&self) -> u8 {
        self.evolution_level
    }

    pub fn death_count(&self) -> u32 {
        self.death_count
    }

    pub fn last_commit_at(&self) -> Option<DateTime<Utc>> {
        self.last_commit_at
    }

    pub fn last_commit_hash(&self) -> Option<&str> {
        self.last_commit_hash.as_deref()
    }

    pub fn decay_charged(&self) -> u32 {
        self.decay_charged
    }

    pub fn stage(&self) -> Stage {
        stage_for(self.evolution_level, self.health)
    }

    pub fn mood(&self) -> Mood {
        mood_for(self.health)
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

/// Clamps any integer into `[0, MAX_HEALTH]`.
pub fn clamp_health(value: i64) -> u8 {
    value.clamp(0, MAX_HEALTH as i64) as u8
}

/// Floors experience at zero and caps it at `u32::MAX`.
pub fn clamp_experience(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Death overrides growth: any zero-health pet is a ghost.
pub fn stage_for(evolution_level: u8, health: u8) -> Stage {
    if health == 0 {
        return Stage::Ghost;
    }
    match evolution_level {
        0 => Stage::Egg,
        1 => Stage::Larva,
        _ => Stage::Beast,
    }
}

pub fn mood_for(health: u8) -> Mood {
    if health == 0 {
        Mood::Dead
    } else if health > HUNGRY_AT_OR_BELOW {
        Mood::Happy
    } else {
        Mood::Hungry
    }
}

/// Evolution level a living pet at `stage` would have. `Ghost` has none.
pub fn level_for_stage(stage: Stage) -> Option<u8> {
    match stage {
        Stage::Egg => Some(0),
        Stage::Larva => Some(1),
        Stage::Beast => Some(2),
        Stage::Ghost => None,
    }
}
