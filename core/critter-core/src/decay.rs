//! Health decay from neglect.
//!
//! One day of grace, then a tiered penalty that grows by a fixed amount per
//! additional full day without a commit:
//!
//! | hours since last commit | decay |
//! |-------------------------|-------|
//! | `h <= 24`               | 0     |
//! | `24 < h <= 48`          | 15    |
//! | `48 < h <= 72`          | 40    |
//! | `h > 72`                | `40 + 35 * floor((h - 72) / 24)` |

use chrono::{DateTime, Utc};

pub const GRACE_PERIOD_HOURS: f64 = 24.0;
pub const DAY_TWO_DECAY: u32 = 15;
pub const DAY_THREE_DECAY: u32 = 40;
pub const DAILY_DECAY_AFTER_DAY_THREE: u32 = 35;

const HOURS_PER_DAY: f64 = 24.0;

/// Health penalty for `hours` without a commit.
///
/// `NaN` and negative inputs decay nothing. Infinite input saturates, so a
/// caller subtracting the result from health always reaches zero.
pub fn decay(hours: f64) -> u32 {
    if hours.is_nan() || hours <= GRACE_PERIOD_HOURS {
        return 0;
    }
    if hours <= 2.0 * HOURS_PER_DAY {
        return DAY_TWO_DECAY;
    }
    if hours <= 3.0 * HOURS_PER_DAY {
        return DAY_THREE_DECAY;
    }

    let extra_days = ((hours - 3.0 * HOURS_PER_DAY) / HOURS_PER_DAY).floor();
    // `as` saturates for huge and infinite floats.
    let extra_days = extra_days as u32;
    DAY_THREE_DECAY.saturating_add(DAILY_DECAY_AFTER_DAY_THREE.saturating_mul(extra_days))
}

/// Hours elapsed since `last_commit`, or infinity when no commit was ever seen.
pub fn hours_since(last_commit: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_commit {
        None => f64::INFINITY,
        Some(at) => {
            let millis = now.signed_duration_since(at).num_milliseconds();
            if millis <= 0 {
                0.0
            } else {
                millis as f64 / 3_600_000.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn matches_tier_boundaries() {
        assert_eq!(decay(0.0), 0);
        assert_eq!(decay(24.0), 0);
        assert_eq!(decay(24.01), 15);
        assert_eq!(decay(48.0), 15);
        assert_eq!(decay(48.01), 40);
        assert_eq!(decay(72.0), 40);
        assert_eq!(decay(95.99), 40);
        assert_eq!(decay(96.0), 75);
        assert_eq!(decay(120.0), 110);
        assert_eq!(decay(50.0), 40);
    }

    #[test]
    fn is_monotonic_non_decreasing() {
        let mut previous = 0;
        let mut hours = 0.0;
        while hours < 24.0 * 30.0 {
            let current = decay(hours);
            assert!(current >= previous, "decay dropped at {} hours", hours);
            previous = current;
            hours += 0.25;
        }
    }

    #[test]
    fn infinite_hours_saturate_instead_of_failing() {
        assert_eq!(decay(f64::INFINITY), u32::MAX);
        assert!(decay(1.0e12) >= 100);
    }

    #[test]
    fn nan_and_negative_hours_decay_nothing() {
        assert_eq!(decay(f64::NAN), 0);
        assert_eq!(decay(-5.0), 0);
        assert_eq!(decay(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn hours_since_handles_missing_and_future_commits() {
        let now = Utc::now();
        assert!(hours_since(None, now).is_infinite());
        assert_eq!(hours_since(Some(now + Duration::hours(2)), now), 0.0);
        let elapsed = hours_since(Some(now - Duration::minutes(90)), now);
        assert!((elapsed - 1.5).abs() < 1e-9);
    }
}
