//! Time-based adjustments: recency bonus, inactivity decay, seasonal reset.
//!
//! All three are evaluated against an explicit timestamp, always in the order
//! recency, decay, season. Each one is a no-op when its trigger is false.

use crate::config::EngineConfig;
use crate::types::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reduction of the lifetime score for inactivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayDelta {
    pub days_inactive: i64,
    pub before: f64,
    pub after: f64,
}

impl DecayDelta {
    pub fn removed(&self) -> f64 {
        self.before - self.after
    }
}

/// Whole days between two instants, never negative.
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_days().max(0)
}

/// Uplift on the streak and combo bonus for a same-day improvement.
pub fn recency_bonus(
    last_session_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    improved: bool,
    bonus_base: f64,
    config: &EngineConfig,
) -> f64 {
    match last_session_at {
        Some(last) if improved && last.date_naive() == now.date_naive() => {
            bonus_base.max(0.0) * config.recency_uplift_pct
        }
        _ => 0.0,
    }
}

/// Decay the lifetime score if the gap since the last session reaches the threshold.
pub fn inactivity_decay(
    last_session_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lifetime_score: f64,
    config: &EngineConfig,
) -> Option<DecayDelta> {
    let days_inactive = days_between(last_session_at?, now);
    if days_inactive < config.decay_threshold_days {
        return None;
    }

    let before = lifetime_score.max(0.0);
    let after = before * (1.0 - config.decay_pct);
    tracing::warn!(
        days_inactive,
        before,
        after,
        "Lifetime score decayed for inactivity"
    );

    Some(DecayDelta {
        days_inactive,
        before,
        after,
    })
}

/// Whether the current season has run its course.
///
/// A profile without a season start is never due; the caller opens a season
/// instead.
pub fn season_due(
    season_started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> bool {
    season_started_at.is_some_and(|start| days_between(start, now) >= config.season_days)
}

/// Season counters cleared by a reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonReset {
    pub previous_start: Option<DateTime<Utc>>,
    pub season_score: f64,
    pub streak_length: u32,
}

/// Clear season-scoped counters and open a new season at `now`.
///
/// Lifetime score, rank and unlocked achievements are untouched.
pub fn reset_season(profile: &mut UserProfile, now: DateTime<Utc>) -> SeasonReset {
    let reset = SeasonReset {
        previous_start: profile.season_started_at,
        season_score: profile.season_score,
        streak_length: profile.streak_length,
    };

    profile.season_score = 0.0;
    profile.streak_length = 0;
    profile.streak_rewarded_through = 0;
    profile.season_started_at = Some(now);

    tracing::warn!(
        identity = %profile.identity,
        season_score = reset.season_score,
        streak_length = reset.streak_length,
        "Season reset"
    );
    reset
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_recency_same_day_only() {
        let config = EngineConfig::default();
        assert_eq!(
            recency_bonus(Some(at(10, 8)), at(10, 20), true, 100.0, &config),
            25.0
        );
        assert_eq!(
            recency_bonus(Some(at(10, 8)), at(10, 20), false, 100.0, &config),
            0.0
        );
        assert_eq!(
            recency_bonus(Some(at(9, 23)), at(10, 1), true, 100.0, &config),
            0.0
        );
        assert_eq!(recency_bonus(None, at(10, 1), true, 100.0, &config), 0.0);
    }

    #[test]
    fn test_decay_threshold() {
        let config = EngineConfig::default();
        let last = at(1, 12);

        assert!(inactivity_decay(Some(last), last + Duration::days(30), 1000.0, &config).is_none());

        let delta = inactivity_decay(Some(last), last + Duration::days(35), 1000.0, &config)
            .expect("35 days should decay");
        assert_eq!(delta.days_inactive, 35);
        assert_eq!(delta.after, 500.0);
        assert_eq!(delta.removed(), 500.0);

        assert!(inactivity_decay(None, last, 1000.0, &config).is_none());
    }

    #[test]
    fn test_season_due() {
        let config = EngineConfig::default();
        let start = at(1, 0);
        assert!(!season_due(Some(start), start + Duration::days(29), &config));
        assert!(season_due(Some(start), start + Duration::days(30), &config));
        assert!(!season_due(None, start, &config));
    }

    #[test]
    fn test_reset_season_keeps_lifetime() {
        let mut profile = UserProfile::new("dev", at(1, 0));
        profile.cumulative_score = 900.0;
        profile.season_score = 700.0;
        profile.streak_length = 4;
        profile.streak_rewarded_through = 4;
        profile.unlocked_achievements.insert("rank_cadet".to_string());

        let reset = reset_season(&mut profile, at(31, 0));
        assert_eq!(reset.season_score, 700.0);
        assert_eq!(reset.streak_length, 4);
        assert_eq!(profile.season_score, 0.0);
        assert_eq!(profile.streak_length, 0);
        assert_eq!(profile.streak_rewarded_through, 0);
        assert_eq!(profile.season_started_at, Some(at(31, 0)));
        assert_eq!(profile.cumulative_score, 900.0);
        assert!(profile.has_unlocked("rank_cadet"));
    }

    #[test]
    fn test_clock_skew_is_not_negative() {
        assert_eq!(days_between(at(10, 0), at(5, 0)), 0);
    }
}
