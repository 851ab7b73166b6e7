//! Per-session evaluation.
//!
//! [`ProgressionEngine::evaluate`] takes the session sequence and the stored
//! profile (if any) and returns the score report, the updated profile and the
//! regression verdict. It never touches storage and never reads the clock:
//! the newest session's timestamp is the evaluation time.

use super::achievements::{self, AchievementContext};
use super::combo;
use super::difficulty;
use super::migration::{self, MigrationReport};
use super::rank;
use super::regression::{self, RegressionInput};
use super::scoring::{self, ScoringInput};
use super::streak::{self, StreakState};
use super::time_mechanics::{self, DecayDelta, SeasonReset};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::{
    Bonuses, Category, Rank, RegressionVerdict, ScoreReport, SessionMetrics, SessionRecord,
    UserProfile, GLOBAL_MAX,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything produced by one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub report: ScoreReport,
    /// Profile to persist
    pub profile: UserProfile,
    pub regression: RegressionVerdict,
    /// Identifiers unlocked by this evaluation, in registry order
    pub new_achievements: Vec<String>,
    /// Present when the stored profile had to be migrated first
    pub migration: Option<MigrationReport>,
    pub decay: Option<DecayDelta>,
    pub season_reset: Option<SeasonReset>,
    /// (before, after) when the rank changed
    pub rank_change: Option<(Rank, Rank)>,
}

/// Composes scoring and progression over a profile.
#[derive(Debug, Clone, Default)]
pub struct ProgressionEngine {
    config: EngineConfig,
}

impl ProgressionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve the profile an evaluation starts from.
    ///
    /// An absent profile becomes a fresh one; a stale one is migrated first.
    pub fn prepare_profile(
        &self,
        identity: &str,
        profile: Option<UserProfile>,
        now: DateTime<Utc>,
    ) -> Result<(UserProfile, Option<MigrationReport>)> {
        let Some(profile) = profile else {
            tracing::info!(identity, "Creating new profile");
            return Ok((UserProfile::new(identity, now), None));
        };

        let (mut profile, report) = migration::migrate(profile)?;
        if profile.identity.is_empty() {
            profile.identity = identity.to_string();
        }
        Ok((profile, (!report.is_noop()).then_some(report)))
    }

    /// Evaluate the newest session in `sessions` against `profile`.
    ///
    /// Earlier sessions in the slice only feed the token trend; when there
    /// are none, the profile history is used instead.
    pub fn evaluate(
        &self,
        identity: &str,
        profile: Option<UserProfile>,
        sessions: &[SessionMetrics],
    ) -> Result<Evaluation> {
        let (current, earlier) = sessions.split_last().ok_or(Error::NoSessions)?;
        let now = current.timestamp;
        let (mut profile, migration) = self.prepare_profile(identity, profile, now)?;
        let previous_rank = profile.current_rank;

        // Thresholds and category scores
        let relief = profile.active_relief(now).copied();
        let thresholds = difficulty::thresholds_for(profile.current_rank, relief.as_ref());
        let previous_tokens: Vec<f64> = if earlier.is_empty() {
            profile.history.iter().filter_map(|r| r.tokens_used).collect()
        } else {
            earlier.iter().filter_map(SessionMetrics::tokens_used).collect()
        };
        let categories = scoring::score_session(&ScoringInput {
            metrics: current,
            previous_tokens: &previous_tokens,
            thresholds: &thresholds,
        });
        let raw_total = scoring::raw_total(&categories);
        let efficiency = current.tokens_used().and_then(|_| {
            categories
                .iter()
                .find(|c| c.category == Category::TokenEfficiency)
                .map(|c| c.fraction())
        });

        // Streak, combo and time adjustments
        let streak = streak::advance(
            &StreakState {
                length: profile.streak_length,
                last_score: profile.last_session_score,
                rewarded_through: profile.streak_rewarded_through,
            },
            raw_total,
        );
        let combo = combo::evaluate(&categories);
        let improved = profile
            .last_session_score
            .is_some_and(|last| raw_total > last);
        let recency = time_mechanics::recency_bonus(
            profile.last_session_at,
            now,
            improved,
            streak.bonus + combo.bonus,
            &self.config,
        );
        let decay = time_mechanics::inactivity_decay(
            profile.last_session_at,
            now,
            profile.cumulative_score,
            &self.config,
        );
        let base_lifetime = decay.map_or(profile.cumulative_score, |d| d.after);

        let mut report = ScoreReport {
            evaluated_at: now,
            categories,
            raw_total,
            streak_multiplier: streak.multiplier,
            streak_length: streak.length,
            combo_categories: combo.qualifying,
            bonuses: Bonuses {
                streak: streak.bonus,
                combo: combo.bonus,
                achievement: 0.0,
                recency,
            },
            decayed: decay.is_some(),
            decay_delta: decay.map_or(0.0, |d| d.removed()),
            season_reset: false,
            final_total: 0.0,
            lifetime_score: base_lifetime,
            rank: profile.current_rank,
            next_rank_distance: 0.0,
            difficulty_factor: thresholds.factor,
        };
        settle(&mut report, base_lifetime);

        // Achievements see the adjusted report and updated lifetime score
        let mut unlocks = achievements::evaluate(&AchievementContext {
            profile: &profile,
            metrics: current,
            report: &report,
        });
        report.bonuses.achievement = achievements::apply(&mut profile, &unlocks);
        let mut checked_rank = report.rank;
        settle(&mut report, base_lifetime);

        // A rank reached through the bonus itself unlocks this session
        while report.rank > checked_rank {
            checked_rank = report.rank;
            let late = achievements::evaluate_rank(&AchievementContext {
                profile: &profile,
                metrics: current,
                report: &report,
            });
            if late.is_empty() {
                break;
            }
            report.bonuses.achievement += achievements::apply(&mut profile, &late);
            settle(&mut report, base_lifetime);
            unlocks.extend(late);
        }

        let history: Vec<SessionRecord> = profile.history.iter().copied().collect();
        let regression = regression::detect(&RegressionInput {
            history: &history,
            best_efficiency: profile.best_efficiency,
            current_efficiency: efficiency,
            current_final: report.final_total,
            window: self.config.score_drop_window,
        });

        // Single write of the new state
        profile.cumulative_score = report.lifetime_score;
        profile.current_rank = report.rank;
        profile.streak_length = streak.length;
        profile.streak_rewarded_through = streak.rewarded_through;
        profile.best_streak = profile.best_streak.max(streak.length);
        profile.last_session_score = Some(raw_total);
        profile.last_session_at = Some(now);
        profile.season_score = profile.season_score.max(report.final_total);
        profile.total_sessions += 1;
        profile.consecutive_declines = regression.decline_count;
        profile.best_efficiency = max_option(profile.best_efficiency, efficiency);
        profile.best_final_score = max_option(profile.best_final_score, Some(report.final_total));
        profile.difficulty_relief = regression::relief_for(regression.severity, now).or(relief);
        profile.efficiency_run_started_at = match efficiency {
            Some(e) if e >= achievements::EXCELLENCE => {
                Some(profile.efficiency_run_started_at.unwrap_or(now))
            }
            _ => None,
        };
        profile.push_history(
            SessionRecord {
                timestamp: now,
                raw_total,
                final_total: report.final_total,
                efficiency,
                tokens_used: current.tokens_used(),
            },
            self.config.history_capacity,
        );

        let season_reset =
            if time_mechanics::season_due(profile.season_started_at, now, &self.config) {
                report.season_reset = true;
                Some(time_mechanics::reset_season(&mut profile, now))
            } else {
                profile.season_started_at.get_or_insert(now);
                None
            };

        let rank_change = (report.rank != previous_rank).then_some((previous_rank, report.rank));
        if let Some((from, to)) = rank_change {
            tracing::info!(
                identity = %profile.identity,
                from = from.as_str(),
                to = to.as_str(),
                "Rank changed"
            );
        }

        tracing::debug!(
            identity = %profile.identity,
            raw_total = report.raw_total,
            final_total = report.final_total,
            lifetime = report.lifetime_score,
            streak = report.streak_length,
            unlocked = unlocks.len(),
            severity = regression.severity.as_str(),
            "Session evaluated"
        );

        Ok(Evaluation {
            report,
            profile,
            regression,
            new_achievements: unlocks.into_iter().map(|u| u.id).collect(),
            migration,
            decay,
            season_reset,
            rank_change,
        })
    }
}

/// Recompute the final total, lifetime score and rank from the report's parts.
fn settle(report: &mut ScoreReport, base_lifetime: f64) {
    report.final_total =
        ScoreReport::compute_final(report.raw_total, report.streak_multiplier, &report.bonuses);
    report.lifetime_score = base_lifetime.max(report.final_total).min(GLOBAL_MAX);
    report.rank = rank::rank_for_score(report.lifetime_score);
    report.next_rank_distance = rank::next_rank_distance(report.lifetime_score);
}

fn max_option(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
