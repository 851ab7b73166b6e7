//! Achievement registry and unlock evaluation.
//!
//! Achievements are plain records in a static, ordered table. Each carries a
//! pure predicate over [`AchievementContext`]; evaluation walks the table in
//! order and unlocks every achievement whose predicate holds and that the
//! profile does not already hold. Repeatable achievements unlock once per
//! instance (day or season) under a composite `id@instance` identifier.

use crate::types::{Category, Rank, ScoreReport, SessionMetrics, UserProfile, MAX_BASE_POINTS};
use chrono::Duration;
use serde::Serialize;

/// Grouping used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Progression,
    Excellence,
    Streak,
    Combo,
    Exploration,
    Special,
    Seasonal,
}

/// How often an achievement can be earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    Once,
    /// Once per calendar day (UTC)
    Daily,
    /// Once per season
    Seasonal,
}

/// Everything a predicate may look at.
///
/// `profile` is the state before this session; `report` is the provisional
/// report for this session, with rank and lifetime score already updated but
/// no achievement bonus yet. Rank achievements are checked once more after
/// the bonus is added.
pub struct AchievementContext<'a> {
    pub profile: &'a UserProfile,
    pub metrics: &'a SessionMetrics,
    pub report: &'a ScoreReport,
}

impl AchievementContext<'_> {
    /// Sessions evaluated including this one.
    pub fn total_sessions(&self) -> u64 {
        self.profile.total_sessions + 1
    }

    /// Sessions on the report's calendar day including this one.
    pub fn sessions_today(&self) -> usize {
        let today = self.report.evaluated_at.date_naive();
        self.profile
            .history
            .iter()
            .filter(|r| r.timestamp.date_naive() == today)
            .count()
            + 1
    }

    fn category_share(&self, category: Category) -> f64 {
        self.report.category(category).map_or(0.0, |c| c.fraction())
    }
}

pub struct AchievementDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub category: AchievementCategory,
    pub description: &'static str,
    pub points: f64,
    pub repeat: Repeat,
    pub predicate: fn(&AchievementContext<'_>) -> bool,
}

impl AchievementDefinition {
    pub fn is_repeatable(&self) -> bool {
        self.repeat != Repeat::Once
    }

    /// Identifier recorded on the profile for this context.
    pub fn unlock_id(&self, ctx: &AchievementContext<'_>) -> String {
        match self.repeat {
            Repeat::Once => self.id.to_string(),
            Repeat::Daily => format!("{}@{}", self.id, ctx.report.evaluated_at.date_naive()),
            Repeat::Seasonal => {
                let season = ctx
                    .profile
                    .season_started_at
                    .unwrap_or(ctx.report.evaluated_at)
                    .date_naive();
                format!("{}@{}", self.id, season)
            }
        }
    }
}

/// An achievement unlocked by one evaluation.
#[derive(Clone)]
pub struct Unlock {
    /// Identifier recorded on the profile (composite for repeatables)
    pub id: String,
    pub definition: &'static AchievementDefinition,
}

impl std::fmt::Debug for Unlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unlock")
            .field("id", &self.id)
            .field("points", &self.definition.points)
            .finish()
    }
}

/// Category share counted as excellent.
pub const EXCELLENCE: f64 = 0.80;

// ============================================
// Predicates
// ============================================

fn reached(ctx: &AchievementContext<'_>, rank: Rank) -> bool {
    ctx.report.rank >= rank
}

fn rank_cadet(ctx: &AchievementContext<'_>) -> bool {
    reached(ctx, Rank::Cadet)
}
fn rank_navigator(ctx: &AchievementContext<'_>) -> bool {
    reached(ctx, Rank::Navigator)
}
fn rank_captain(ctx: &AchievementContext<'_>) -> bool {
    reached(ctx, Rank::Captain)
}
fn rank_admiral(ctx: &AchievementContext<'_>) -> bool {
    reached(ctx, Rank::Admiral)
}
fn rank_legend(ctx: &AchievementContext<'_>) -> bool {
    reached(ctx, Rank::GalacticLegend)
}

fn excellence_efficiency(ctx: &AchievementContext<'_>) -> bool {
    ctx.category_share(Category::TokenEfficiency) >= EXCELLENCE
}
fn excellence_adoption(ctx: &AchievementContext<'_>) -> bool {
    ctx.category_share(Category::OptimizationAdoption) >= EXCELLENCE
}
fn excellence_cache(ctx: &AchievementContext<'_>) -> bool {
    ctx.category_share(Category::CacheEffectiveness) >= EXCELLENCE
}
fn excellence_waste(ctx: &AchievementContext<'_>) -> bool {
    ctx.category_share(Category::WasteAwareness) >= EXCELLENCE
}
fn excellence_cost(ctx: &AchievementContext<'_>) -> bool {
    ctx.category_share(Category::CostEfficiency) >= EXCELLENCE
}

fn streak_5(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.streak_length >= 5
}
fn streak_10(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.streak_length >= 10
}
fn streak_20(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.streak_length >= 20
}

fn combo_focused(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.combo_categories >= 2
}
fn combo_wellrounded(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.combo_categories >= 3
}
fn combo_mastery(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.combo_categories >= 5
}

fn explore_10(ctx: &AchievementContext<'_>) -> bool {
    ctx.total_sessions() >= 10
}
fn explore_50(ctx: &AchievementContext<'_>) -> bool {
    ctx.total_sessions() >= 50
}
fn explore_100(ctx: &AchievementContext<'_>) -> bool {
    ctx.total_sessions() >= 100
}
fn explore_250(ctx: &AchievementContext<'_>) -> bool {
    ctx.total_sessions() >= 250
}

fn zero_waste(ctx: &AchievementContext<'_>) -> bool {
    let (Some(wasted), Some(used)) = (ctx.metrics.tokens_wasted, ctx.metrics.tokens_used()) else {
        return false;
    };
    used > 0.0 && (wasted.max(0) as f64) / used < 0.10
}

/// This session extends a run of 80%+ efficiency that began at least 30
/// days ago.
fn consistent_month(ctx: &AchievementContext<'_>) -> bool {
    let now = ctx.report.evaluated_at;
    ctx.category_share(Category::TokenEfficiency) >= EXCELLENCE
        && ctx
            .profile
            .efficiency_run_started_at
            .is_some_and(|start| now - start >= Duration::days(30))
}

fn speedrun(ctx: &AchievementContext<'_>) -> bool {
    ctx.sessions_today() >= 5
}

fn comeback(ctx: &AchievementContext<'_>) -> bool {
    ctx.profile.consecutive_declines >= 2
        && ctx
            .profile
            .last_session_score
            .is_some_and(|last| ctx.report.raw_total > last)
}

fn personal_best(ctx: &AchievementContext<'_>) -> bool {
    ctx.profile
        .best_final_score
        .is_some_and(|best| ctx.report.final_total > best)
}

fn season_podium(ctx: &AchievementContext<'_>) -> bool {
    ctx.report.raw_total >= MAX_BASE_POINTS * EXCELLENCE
}

// ============================================
// Registry
// ============================================

macro_rules! achievement {
    ($id:ident, $name:expr, $category:ident, $points:expr, $repeat:ident, $desc:expr) => {
        achievement!($id, $name, $category, $points, $repeat, $desc, $id)
    };
    ($id:ident, $name:expr, $category:ident, $points:expr, $repeat:ident, $desc:expr, $pred:ident) => {
        AchievementDefinition {
            id: stringify!($id),
            name: $name,
            category: AchievementCategory::$category,
            description: $desc,
            points: $points,
            repeat: Repeat::$repeat,
            predicate: $pred,
        }
    };
}

/// All achievements in evaluation order.
pub static REGISTRY: &[AchievementDefinition] = &[
    achievement!(rank_cadet, "Cadet Wings", Progression, 20.0, Once, "Complete a first scored session"),
    achievement!(rank_navigator, "Navigator", Progression, 50.0, Once, "Reach the Navigator rank"),
    achievement!(rank_captain, "Captain's Chair", Progression, 100.0, Once, "Reach the Captain rank"),
    achievement!(rank_admiral, "Admiralty", Progression, 150.0, Once, "Reach the Admiral rank"),
    achievement!(rank_legend, "Galactic Legend", Progression, 200.0, Once, "Reach the top rank"),
    achievement!(excellence_efficiency, "Lean Machine", Excellence, 75.0, Once, "Score 80% in token efficiency"),
    achievement!(excellence_adoption, "Practitioner", Excellence, 75.0, Once, "Score 80% in optimization adoption"),
    achievement!(excellence_cache, "Cache Hit", Excellence, 75.0, Once, "Score 80% in cache effectiveness"),
    achievement!(excellence_waste, "Waste Not", Excellence, 75.0, Once, "Score 80% in waste awareness"),
    achievement!(excellence_cost, "Budget Hawk", Excellence, 75.0, Once, "Score 80% in cost efficiency"),
    achievement!(streak_5, "Hot Streak", Streak, 100.0, Once, "Improve five sessions in a row"),
    achievement!(streak_10, "On Fire", Streak, 150.0, Once, "Improve ten sessions in a row"),
    achievement!(streak_20, "Unstoppable", Streak, 200.0, Once, "Improve twenty sessions in a row"),
    achievement!(combo_focused, "Focused", Combo, 50.0, Once, "Two categories at 80% in one session"),
    achievement!(combo_wellrounded, "Well-Rounded", Combo, 100.0, Once, "Three categories at 80% in one session"),
    achievement!(combo_mastery, "Mastery", Combo, 200.0, Once, "Five categories at 80% in one session"),
    achievement!(explore_10, "Explorer I", Exploration, 25.0, Once, "Complete 10 sessions"),
    achievement!(explore_50, "Explorer II", Exploration, 75.0, Once, "Complete 50 sessions"),
    achievement!(explore_100, "Explorer III", Exploration, 150.0, Once, "Complete 100 sessions"),
    achievement!(explore_250, "Explorer IV", Exploration, 200.0, Once, "Complete 250 sessions"),
    achievement!(special_zero_waste, "Zero Waste", Special, 60.0, Once, "Waste under 10% of tokens in a session", zero_waste),
    achievement!(special_consistency, "Steady Hand", Special, 150.0, Once, "Keep 80% efficiency for 30 days", consistent_month),
    achievement!(special_speedrun, "Speedrun", Special, 100.0, Daily, "Five sessions in one day", speedrun),
    achievement!(special_comeback, "Comeback", Special, 80.0, Once, "Improve after two or more declines", comeback),
    achievement!(special_peak, "New Peak", Special, 120.0, Once, "Beat your best final score", personal_best),
    achievement!(season_podium, "Season Podium", Seasonal, 100.0, Seasonal, "Raw score of 80% of the rubric within a season"),
];

/// Look up a definition by plain or composite identifier.
pub fn find(id: &str) -> Option<&'static AchievementDefinition> {
    let base = id.split('@').next().unwrap_or(id);
    REGISTRY.iter().find(|def| def.id == base)
}

/// Achievements newly satisfied in this context, in registry order.
pub fn evaluate(ctx: &AchievementContext<'_>) -> Vec<Unlock> {
    evaluate_matching(ctx, |_| true)
}

/// Rank achievements newly satisfied in this context.
///
/// Used after the achievement bonus has been added, when that bonus alone
/// lifted the rank.
pub fn evaluate_rank(ctx: &AchievementContext<'_>) -> Vec<Unlock> {
    evaluate_matching(ctx, |def| def.category == AchievementCategory::Progression)
}

fn evaluate_matching(
    ctx: &AchievementContext<'_>,
    include: impl Fn(&AchievementDefinition) -> bool,
) -> Vec<Unlock> {
    REGISTRY
        .iter()
        .filter(|def| include(def))
        .filter_map(|def| {
            let id = def.unlock_id(ctx);
            if ctx.profile.has_unlocked(&id) || !(def.predicate)(ctx) {
                return None;
            }
            Some(Unlock {
                id,
                definition: def,
            })
        })
        .collect()
}

/// Record unlocks on the profile. Returns the bonus they are worth.
pub fn apply(profile: &mut UserProfile, unlocks: &[Unlock]) -> f64 {
    let mut bonus = 0.0;
    for unlock in unlocks {
        if profile.unlocked_achievements.insert(unlock.id.clone()) {
            bonus += unlock.definition.points;
            tracing::info!(
                identity = %profile.identity,
                achievement = %unlock.id,
                points = unlock.definition.points,
                "Achievement unlocked"
            );
        }
    }
    bonus
}

// ============================================
// Catalogue
// ============================================

/// One registry entry with the profile's progress on it.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementStatus {
    pub id: &'static str,
    pub name: &'static str,
    pub category: AchievementCategory,
    pub description: &'static str,
    pub points: f64,
    pub repeat: Repeat,
    /// Times unlocked (0 or 1 for one-off achievements)
    pub unlocked: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementStats {
    pub total: usize,
    pub unlocked: usize,
    pub completion_pct: f64,
    pub points_earned: f64,
}

fn unlock_count(profile: &UserProfile, def: &AchievementDefinition) -> usize {
    profile
        .unlocked_achievements
        .iter()
        .filter(|id| id.split('@').next() == Some(def.id))
        .count()
}

pub fn catalogue(profile: &UserProfile) -> Vec<AchievementStatus> {
    REGISTRY
        .iter()
        .map(|def| AchievementStatus {
            id: def.id,
            name: def.name,
            category: def.category,
            description: def.description,
            points: def.points,
            repeat: def.repeat,
            unlocked: unlock_count(profile, def),
        })
        .collect()
}

pub fn stats(profile: &UserProfile) -> AchievementStats {
    let catalogue = catalogue(profile);
    let unlocked = catalogue.iter().filter(|s| s.unlocked > 0).count();
    let points_earned = catalogue
        .iter()
        .map(|s| s.points * s.unlocked as f64)
        .sum();

    AchievementStats {
        total: catalogue.len(),
        unlocked,
        completion_pct: unlocked as f64 / catalogue.len() as f64 * 100.0,
        points_earned,
    }
}
