//! Rubric-version migration of persisted profiles.
//!
//! Each step rescales point-valued fields by the ratio of the new to the old
//! rubric maximum, remaps achievement identifiers and recomputes the rank.
//! Session history is carried over untouched. The version field is bumped
//! only after the rest of the step succeeded, so a profile is either fully
//! migrated or left at its old version.

use super::{achievements, rank};
use crate::error::{Error, Result};
use crate::types::{UserProfile, CURRENT_SCHEMA_VERSION, GLOBAL_MAX};
use serde::Serialize;
use std::collections::BTreeSet;

/// Oldest rubric a profile can be migrated from. Lower or missing versions
/// are read as this one.
pub const OLDEST_SUPPORTED_VERSION: u32 = 2;

/// Maximum base points per rubric version.
pub const RUBRIC_MAXIMUMS: &[(u32, f64)] = &[(2, 1450.0), (3, 2300.0)];

/// v2 achievement identifiers and their v3 replacements. Several old
/// identifiers may collapse into one.
pub const V2_ACHIEVEMENT_MAP: &[(&str, &str)] = &[
    ("first_session", "rank_cadet"),
    ("rank_up_navigator", "rank_navigator"),
    ("rank_up_captain", "rank_captain"),
    ("rank_up_admiral", "rank_admiral"),
    ("token_saver", "excellence_efficiency"),
    ("efficiency_expert", "excellence_efficiency"),
    ("optimizer", "excellence_adoption"),
    ("cache_master", "excellence_cache"),
    ("waste_not", "excellence_waste"),
    ("budget_hawk", "excellence_cost"),
    ("hot_streak", "streak_5"),
    ("on_fire", "streak_5"),
    ("unstoppable", "streak_10"),
    ("triple_threat", "combo_wellrounded"),
    ("explorer_10", "explore_10"),
    ("explorer_50", "explore_50"),
];

/// What a migration did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub score_before: f64,
    pub score_after: f64,
    /// (old id, new id) pairs that were renamed
    pub remapped: Vec<(String, String)>,
    /// Old ids folded into an id that was already present
    pub collapsed: Vec<String>,
    /// Old ids with no counterpart in the current rubric
    pub dropped: Vec<String>,
    pub warnings: Vec<String>,
}

impl MigrationReport {
    /// Whether anything changed.
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }

    /// Achievements before migration, as accounted for by the report.
    pub fn accounted(&self, after: usize) -> usize {
        after + self.collapsed.len() + self.dropped.len()
    }
}

/// Rubric version of a stored profile, with legacy tags normalized.
pub fn effective_version(profile: &UserProfile) -> u32 {
    profile.schema_version.max(OLDEST_SUPPORTED_VERSION)
}

/// Whether the profile was written by an older rubric.
pub fn needs_migration(profile: &UserProfile) -> bool {
    profile.schema_version < CURRENT_SCHEMA_VERSION
}

fn rubric_max(version: u32) -> Option<f64> {
    RUBRIC_MAXIMUMS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, max)| *max)
}

/// Bring `profile` up to [`CURRENT_SCHEMA_VERSION`].
///
/// A current profile comes back unchanged with a no-op report. A profile
/// from a newer rubric is rejected.
pub fn migrate(profile: UserProfile) -> Result<(UserProfile, MigrationReport)> {
    if profile.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(Error::UnsupportedSchemaVersion {
            found: profile.schema_version,
            current: CURRENT_SCHEMA_VERSION,
        });
    }

    let mut report = MigrationReport {
        from_version: profile.schema_version,
        to_version: profile.schema_version,
        score_before: profile.cumulative_score,
        score_after: profile.cumulative_score,
        ..Default::default()
    };
    if !needs_migration(&profile) {
        return Ok((profile, report));
    }

    let mut current = profile;
    let mut version = effective_version(&current);
    if version != current.schema_version {
        report.warnings.push(format!(
            "schema version {} read as {}",
            current.schema_version, version
        ));
    }

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        current = step(current, version, next, &mut report)?;
        version = next;
    }

    report.to_version = current.schema_version;
    report.score_after = current.cumulative_score;

    tracing::info!(
        identity = %current.identity,
        from = report.from_version,
        to = report.to_version,
        score_before = report.score_before,
        score_after = report.score_after,
        dropped = report.dropped.len(),
        "Profile migrated"
    );
    Ok((current, report))
}

fn step(
    profile: UserProfile,
    from: u32,
    to: u32,
    report: &mut MigrationReport,
) -> Result<UserProfile> {
    let (Some(old_max), Some(new_max)) = (rubric_max(from), rubric_max(to)) else {
        return Err(Error::UnsupportedSchemaVersion {
            found: from,
            current: CURRENT_SCHEMA_VERSION,
        });
    };
    let rescale = |points: f64| (points.max(0.0) * new_max / old_max).min(GLOBAL_MAX);

    let scaled = profile.cumulative_score.max(0.0) * new_max / old_max;
    if scaled > GLOBAL_MAX {
        tracing::warn!(
            identity = %profile.identity,
            scaled,
            cap = GLOBAL_MAX,
            "Migrated score capped"
        );
        report.warnings.push(format!(
            "score {:.1} capped at {:.0} after rescaling v{} to v{}",
            scaled, GLOBAL_MAX, from, to
        ));
    }

    let mut next = profile.clone();
    next.cumulative_score = rescale(profile.cumulative_score);
    next.season_score = rescale(profile.season_score);
    next.last_session_score = profile.last_session_score.map(rescale);
    next.best_final_score = profile.best_final_score.map(rescale);
    next.current_rank = rank::rank_for_score(next.cumulative_score);
    next.unlocked_achievements = remap_achievements(&profile.unlocked_achievements, report);

    // Version last
    next.schema_version = to;
    Ok(next)
}

fn remap_achievements(old: &BTreeSet<String>, report: &mut MigrationReport) -> BTreeSet<String> {
    let mut remapped = BTreeSet::new();

    for id in old {
        let target = if achievements::find(id).is_some() {
            id.clone()
        } else if let Some((_, new_id)) = V2_ACHIEVEMENT_MAP
            .iter()
            .find(|(old_id, _)| *old_id == id.as_str())
        {
            report.remapped.push((id.clone(), new_id.to_string()));
            new_id.to_string()
        } else {
            tracing::warn!(achievement = %id, "Dropping unknown achievement during migration");
            report
                .warnings
                .push(format!("unknown achievement '{}' dropped", id));
            report.dropped.push(id.clone());
            continue;
        };

        if !remapped.insert(target) {
            report.collapsed.push(id.clone());
        }
    }
    remapped
}
