//! End-to-end lifecycle scenarios driven through the public API only.

use chrono::{Duration, Utc};
use critter_core::{entry_for_feed, ActivityLog, FeedOutcome, Mood, PetEngine, Stage};
use serde_json::json;

#[test]
fn fourteen_commits_evolve_an_egg_into_a_larva() {
    let mut engine = PetEngine::new();
    let mut log = ActivityLog::new();

    for i in 0..13 {
        let message = format!("commit {}", i);
        let outcome = engine.feed_from_commit("a1b2c3d", &message, 1_700_000_000_000 + i);
        log.append(entry_for_feed(&outcome, &message, 1_700_000_000_000 + i));
        assert_eq!(engine.stage(), Stage::Egg);
    }
    assert_eq!(engine.vitals().experience(), 195);

    let outcome = engine.feed_from_commit("d4e5f6a", "the big one", 1_700_000_100_000);
    assert_eq!(
        outcome,
        FeedOutcome::Fed {
            health: 100,
            evolved_to: Some(Stage::Larva),
        }
    );
    assert_eq!(engine.vitals().evolution_level(), 1);
    assert_eq!(engine.vitals().experience(), 0);
    assert_eq!(engine.vitals().health(), 100);
    assert_eq!(engine.mood(), Mood::Happy);
    assert_eq!(log.len(), 13);
}

#[test]
fn fifty_hours_of_neglect_kills_a_weak_pet() {
    let mut engine = PetEngine::new();
    engine.load_from_persisted(&json!({
        "health": 20,
        "experience": 60,
        "evolutionLevel": 1
    }));

    let outcome = engine.apply_time_decay(50.0);
    assert!(outcome.died);
    assert_eq!(engine.vitals().health(), 0);
    assert_eq!(engine.vitals().experience(), 0);
    assert_eq!(engine.stage(), Stage::Ghost);
    assert_eq!(engine.mood(), Mood::Dead);

    let outcome = engine.feed_from_commit("0ff1ce", "Resurrect please", 1);
    assert!(outcome.is_revival());
    assert_eq!(engine.vitals().health(), 75);
    assert_eq!(engine.vitals().death_count(), 1);
    assert_eq!(engine.stage(), Stage::Egg);
}

#[test]
fn restart_catch_up_uses_the_persisted_commit_time() {
    let now = Utc::now();
    let last_commit = now - Duration::hours(30);

    let mut engine = PetEngine::new();
    let report = engine.load_from_persisted(&json!({
        "health": 90,
        "experience": 10,
        "evolutionLevel": 0,
        "stage": "EGG",
        "mood": "HAPPY",
        "deathCount": 0,
        "lastCommitTimestamp": last_commit.timestamp_millis(),
        "lastCommitHash": "abcdef0",
        "watchedPath": "/home/dev/project"
    }));
    assert!(report.is_clean(), "corrections: {:?}", report.corrections);

    let outcome = engine.catch_up(now);
    assert_eq!(outcome.health, 75);
    assert!(!outcome.died);
}

#[test]
fn repeated_restarts_do_not_charge_the_same_decay_twice() {
    let now = Utc::now();
    let last_commit = now - Duration::hours(30);

    let mut engine = PetEngine::new();
    engine.load_from_persisted(&json!({
        "health": 90,
        "lastCommitTimestamp": last_commit.timestamp_millis(),
        "lastCommitHash": "abcdef0"
    }));
    assert_eq!(engine.catch_up(now).health, 75);

    let saved = serde_json::to_value(engine.snapshot(None)).expect("serialize");
    assert_eq!(saved["decayCharged"], 15);

    let mut restarted = PetEngine::new();
    let report = restarted.load_from_persisted(&saved);
    assert!(report.is_clean(), "corrections: {:?}", report.corrections);
    assert_eq!(restarted.catch_up(now + Duration::hours(1)).health, 75);

    // 50h since the commit: the 40 tier, of which 15 is already paid.
    assert_eq!(restarted.catch_up(now + Duration::hours(20)).health, 50);

    restarted.feed_from_commit("bcdef01", "back at it", now.timestamp_millis());
    assert_eq!(restarted.vitals().decay_charged(), 0);
    assert_eq!(restarted.catch_up(now + Duration::hours(30)).health, 55);
}

#[test]
fn snapshot_survives_a_save_and_reload() {
    let mut engine = PetEngine::new();
    for _ in 0..3 {
        engine.feed_from_commit("abc1234", "work", 1_700_000_000_000);
    }
    engine.apply_health_delta(-45);
    let snapshot = engine.snapshot(Some("/repo".to_string()));
    let saved = serde_json::to_value(&snapshot).expect("serialize");

    let mut restored = PetEngine::new();
    let report = restored.load_from_persisted(&saved);
    assert!(report.is_clean(), "corrections: {:?}", report.corrections);
    assert_eq!(restored.vitals(), engine.vitals());
    assert_eq!(report.watched_path.as_deref(), Some("/repo"));
}

#[test]
fn corrupted_saves_never_fail_to_load() {
    let payloads = [
        json!({"health": -5, "stage": 12, "mood": null}),
        json!({"health": 1e300, "experience": "lots"}),
        json!({"evolutionLevel": 1.5, "deathCount": 3.9}),
        json!([]),
        json!(true),
    ];
    for payload in payloads {
        let mut engine = PetEngine::new();
        engine.load_from_persisted(&payload);
        let vitals = engine.vitals();
        assert!(vitals.health() <= 100);
        assert!(vitals.evolution_level() <= 2);
        if vitals.health() == 0 {
            assert_eq!(vitals.experience(), 0);
            assert_eq!(engine.stage(), Stage::Ghost);
        }
    }
}
