//! Core domain types for tokencraft
//!
//! These types describe what flows into and out of the progression engine.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One normalized usage session, described by [`SessionMetrics`] |
//! | **Category** | One of the ten rubric dimensions a session is scored on |
//! | **Rank** | Named progression tier derived from the lifetime score |
//! | **Streak** | Run of sessions each scoring at or above the previous one |
//! | **Combo** | Several categories at excellence in the same session |
//! | **Season** | Fixed-length window after which season counters reset |
//! | **Schema version** | Rubric version a persisted profile conforms to |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Rubric version implemented by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Sum of all category maximums in the current rubric.
pub const MAX_BASE_POINTS: f64 = 2300.0;

/// Headroom above the base rubric reserved for multipliers and bonuses.
pub const BONUS_HEADROOM: f64 = 575.0;

/// Upper bound for any final session score.
pub const GLOBAL_MAX: f64 = MAX_BASE_POINTS + BONUS_HEADROOM;

// ============================================
// Rank
// ============================================

/// Progression tier, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    #[default]
    Cadet,
    Navigator,
    Pilot,
    Explorer,
    Captain,
    Commander,
    Admiral,
    Commodore,
    FleetAdmiral,
    GalacticLegend,
}

impl Rank {
    /// All ranks, lowest first.
    pub const ALL: [Rank; 10] = [
        Rank::Cadet,
        Rank::Navigator,
        Rank::Pilot,
        Rank::Explorer,
        Rank::Captain,
        Rank::Commander,
        Rank::Admiral,
        Rank::Commodore,
        Rank::FleetAdmiral,
        Rank::GalacticLegend,
    ];

    /// Zero-based position in [`Rank::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Rank at `index`, clamped to the valid range.
    pub fn from_index(index: usize) -> Rank {
        Rank::ALL[index.min(Rank::ALL.len() - 1)]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Cadet => "cadet",
            Rank::Navigator => "navigator",
            Rank::Pilot => "pilot",
            Rank::Explorer => "explorer",
            Rank::Captain => "captain",
            Rank::Commander => "commander",
            Rank::Admiral => "admiral",
            Rank::Commodore => "commodore",
            Rank::FleetAdmiral => "fleet_admiral",
            Rank::GalacticLegend => "galactic_legend",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Rank::Cadet => "Cadet",
            Rank::Navigator => "Navigator",
            Rank::Pilot => "Pilot",
            Rank::Explorer => "Explorer",
            Rank::Captain => "Captain",
            Rank::Commander => "Commander",
            Rank::Admiral => "Admiral",
            Rank::Commodore => "Commodore",
            Rank::FleetAdmiral => "Fleet Admiral",
            Rank::GalacticLegend => "Galactic Legend",
        }
    }

    /// Parse either the identifier or the display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Rank> {
        let wanted = name.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Rank::ALL.into_iter().find(|r| r.as_str() == wanted)
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================
// Categories
// ============================================

/// Rubric category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TokenEfficiency,
    OptimizationAdoption,
    ImprovementTrend,
    WasteAwareness,
    CacheEffectiveness,
    ToolEfficiency,
    CostEfficiency,
    SessionFocus,
    LearningGrowth,
    BestPractices,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TokenEfficiency => "token_efficiency",
            Category::OptimizationAdoption => "optimization_adoption",
            Category::ImprovementTrend => "improvement_trend",
            Category::WasteAwareness => "waste_awareness",
            Category::CacheEffectiveness => "cache_effectiveness",
            Category::ToolEfficiency => "tool_efficiency",
            Category::CostEfficiency => "cost_efficiency",
            Category::SessionFocus => "session_focus",
            Category::LearningGrowth => "learning_growth",
            Category::BestPractices => "best_practices",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Points earned in one category.
///
/// Invariant: `0 <= earned <= maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    pub earned: f64,
    pub maximum: f64,
}

impl CategoryScore {
    /// Earned share of the maximum, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.maximum <= 0.0 {
            0.0
        } else {
            self.earned / self.maximum
        }
    }
}

// ============================================
// Session input
// ============================================

/// Optimization practice that can be applied during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    DeferDocs,
    ProjectInstructions,
    ConciseMode,
    DirectCommands,
    ContextManagement,
    XmlTags,
    ChainOfThought,
    Examples,
}

/// Tool-call counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCallCounts {
    /// Edits whose target file was read earlier in the session
    pub edits_after_read: i64,
    /// All edit calls
    pub edits: i64,
    /// Assistant turns issuing more than one tool call
    pub parallel_turns: i64,
    /// Assistant turns issuing at least one tool call
    pub tool_turns: i64,
    /// Searches through the dedicated search tools
    pub dedicated_searches: i64,
    /// Searches through shell commands (grep, find)
    pub shell_searches: i64,
}

/// Workspace setup observed alongside the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupChecks {
    /// Most-used projects carrying an instructions file
    pub instructed_projects: i64,
    /// Number of most-used projects inspected
    pub top_projects: i64,
    pub memory_notes: bool,
    pub custom_tooling: bool,
}

/// Normalized metrics for one session.
///
/// Every measured field is optional: a missing field scores zero in the
/// categories that need it. Negative counts are clamped to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetrics {
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: Option<i64>,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub tokens_saved: Option<i64>,
    pub tokens_wasted: Option<i64>,
    pub cache_read_tokens: Option<i64>,
    pub cache_hit_ratio: Option<f64>,
    pub optimizations: Option<Vec<OptimizationKind>>,
    pub message_count: Option<i64>,
    pub tools: Option<ToolCallCounts>,
    pub cost_usd: Option<f64>,
    pub setup: Option<SetupChecks>,
}

impl SessionMetrics {
    /// Input plus output tokens, if either was measured.
    pub fn tokens_used(&self) -> Option<f64> {
        match (self.tokens_input, self.tokens_output) {
            (None, None) => None,
            (i, o) => Some(i.unwrap_or(0).max(0).saturating_add(o.unwrap_or(0).max(0)) as f64),
        }
    }

    /// Cache hit ratio, reported or derived from cache reads.
    pub fn cache_hit(&self) -> Option<f64> {
        if let Some(ratio) = self.cache_hit_ratio.filter(|r| r.is_finite()) {
            return Some(ratio.clamp(0.0, 1.0));
        }
        let reads = self.cache_read_tokens?.max(0) as f64;
        let fresh = self.tokens_input.unwrap_or(0).max(0) as f64;
        if reads + fresh <= 0.0 {
            return None;
        }
        Some(reads / (reads + fresh))
    }
}

// ============================================
// Score report
// ============================================

/// Additive bonuses applied on top of the multiplied raw score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bonuses {
    pub streak: f64,
    pub combo: f64,
    pub achievement: f64,
    pub recency: f64,
}

impl Bonuses {
    pub fn total(&self) -> f64 {
        self.streak + self.combo + self.achievement + self.recency
    }
}

/// Result of evaluating one session.
///
/// Invariant: `final_total = clamp(raw_total * streak_multiplier + bonuses.total(), 0, GLOBAL_MAX)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub evaluated_at: DateTime<Utc>,
    pub categories: Vec<CategoryScore>,
    pub raw_total: f64,
    pub streak_multiplier: f64,
    pub streak_length: u32,
    pub combo_categories: usize,
    pub bonuses: Bonuses,
    /// Lifetime score was reduced for inactivity before this session counted
    pub decayed: bool,
    /// Points removed by decay (0 when not decayed)
    pub decay_delta: f64,
    pub season_reset: bool,
    pub final_total: f64,
    /// Lifetime score after this session
    pub lifetime_score: f64,
    pub rank: Rank,
    pub next_rank_distance: f64,
    /// Difficulty tightening factor the thresholds were derived with
    pub difficulty_factor: f64,
}

impl ScoreReport {
    /// Recompute `final_total` from its components.
    pub fn compute_final(raw_total: f64, multiplier: f64, bonuses: &Bonuses) -> f64 {
        (raw_total * multiplier + bonuses.total()).clamp(0.0, GLOBAL_MAX)
    }

    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

// ============================================
// Profile
// ============================================

/// Compact record of a past session kept in the profile history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub raw_total: f64,
    pub final_total: f64,
    /// Token-efficiency earned share, if measured
    pub efficiency: Option<f64>,
    pub tokens_used: Option<f64>,
}

/// Temporary easing of thresholds granted after a regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRelief {
    /// Fractional loosening of the tightening factor (0.05 = 5% easier)
    pub easing: f64,
    pub until: DateTime<Utc>,
}

impl DifficultyRelief {
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        at < self.until
    }
}

/// Persisted progression state for one identity.
///
/// The progression engine is the only writer. Missing fields in a stored
/// payload fall back to their defaults; a missing `schema_version` reads as 0,
/// which migration treats as the oldest supported rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub identity: String,
    pub schema_version: u32,
    pub cumulative_score: f64,
    /// Best final score in the current season
    pub season_score: f64,
    pub current_rank: Rank,
    pub streak_length: u32,
    pub best_streak: u32,
    /// Highest streak breakpoint already rewarded in the current run
    pub streak_rewarded_through: u32,
    /// Raw total of the previous session
    pub last_session_score: Option<f64>,
    pub last_session_at: Option<DateTime<Utc>>,
    pub season_started_at: Option<DateTime<Utc>>,
    pub unlocked_achievements: BTreeSet<String>,
    pub history: VecDeque<SessionRecord>,
    pub total_sessions: u64,
    pub consecutive_declines: u32,
    pub best_efficiency: Option<f64>,
    pub best_final_score: Option<f64>,
    pub difficulty_relief: Option<DifficultyRelief>,
    /// First session of the current unbroken run at 80%+ token efficiency
    pub efficiency_run_started_at: Option<DateTime<Utc>>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            identity: String::new(),
            schema_version: 0,
            cumulative_score: 0.0,
            season_score: 0.0,
            current_rank: Rank::Cadet,
            streak_length: 0,
            best_streak: 0,
            streak_rewarded_through: 0,
            last_session_score: None,
            last_session_at: None,
            season_started_at: None,
            unlocked_achievements: BTreeSet::new(),
            history: VecDeque::new(),
            total_sessions: 0,
            consecutive_declines: 0,
            best_efficiency: None,
            best_final_score: None,
            difficulty_relief: None,
            efficiency_run_started_at: None,
        }
    }
}

impl UserProfile {
    /// Fresh profile at the current rubric version and the lowest rank.
    pub fn new(identity: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            schema_version: CURRENT_SCHEMA_VERSION,
            season_started_at: Some(now),
            ..Default::default()
        }
    }

    /// Append a record, evicting the oldest entries beyond `capacity`.
    pub fn push_history(&mut self, record: SessionRecord, capacity: usize) {
        self.history.push_back(record);
        while self.history.len() > capacity.max(1) {
            self.history.pop_front();
        }
    }

    /// Relief still in effect at `at`.
    pub fn active_relief(&self, at: DateTime<Utc>) -> Option<&DifficultyRelief> {
        self.difficulty_relief.as_ref().filter(|r| r.is_active(at))
    }

    pub fn has_unlocked(&self, id: &str) -> bool {
        self.unlocked_achievements.contains(id)
    }
}

// ============================================
// Snapshots
// ============================================

/// Append-only record of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub identity: String,
    pub taken_at: DateTime<Utc>,
    pub report: ScoreReport,
    pub metrics: SessionMetrics,
}

// ============================================
// Regression
// ============================================

/// Kind of regression signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionKind {
    EfficiencyDrop,
    ScoreDrop,
    ConsecutiveDecline,
}

impl RegressionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegressionKind::EfficiencyDrop => "efficiency_drop",
            RegressionKind::ScoreDrop => "score_drop",
            RegressionKind::ConsecutiveDecline => "consecutive_decline",
        }
    }
}

/// One regression signal.
///
/// `magnitude` is a relative drop for the two drop signals and a session
/// count for consecutive decline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionSignal {
    pub kind: RegressionKind,
    pub magnitude: f64,
    pub triggered: bool,
}

/// Regression severity, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

/// Outcome of regression detection for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionVerdict {
    pub severity: Severity,
    pub signals: Vec<RegressionSignal>,
    pub guidance: String,
    /// Per-signal recovery hints for the triggered signals
    pub recommendations: Vec<String>,
    /// Length of the strictly decreasing run ending at this session
    pub decline_count: u32,
}

impl RegressionVerdict {
    pub fn triggered(&self) -> impl Iterator<Item = &RegressionSignal> {
        self.signals.iter().filter(|s| s.triggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(score: f64) -> SessionRecord {
        SessionRecord {
            timestamp: Utc::now(),
            raw_total: score,
            final_total: score,
            efficiency: None,
            tokens_used: None,
        }
    }

    #[test]
    fn test_rank_index_clamps() {
        assert_eq!(Rank::from_index(0), Rank::Cadet);
        assert_eq!(Rank::from_index(4), Rank::Captain);
        assert_eq!(Rank::from_index(99), Rank::GalacticLegend);
    }

    #[test]
    fn test_rank_from_name() {
        assert_eq!(Rank::from_name("Fleet Admiral"), Some(Rank::FleetAdmiral));
        assert_eq!(Rank::from_name("galactic_legend"), Some(Rank::GalacticLegend));
        assert_eq!(Rank::from_name("CAPTAIN"), Some(Rank::Captain));
        assert_eq!(Rank::from_name("ensign"), None);
    }

    #[test]
    fn test_tokens_used_clamps_negative() {
        let metrics = SessionMetrics {
            tokens_input: Some(-50),
            tokens_output: Some(200),
            ..Default::default()
        };
        assert_eq!(metrics.tokens_used(), Some(200.0));
        assert_eq!(SessionMetrics::default().tokens_used(), None);
    }

    #[test]
    fn test_tokens_used_saturates() {
        let metrics = SessionMetrics {
            tokens_input: Some(i64::MAX),
            tokens_output: Some(1),
            ..Default::default()
        };
        assert_eq!(metrics.tokens_used(), Some(i64::MAX as f64));
    }

    #[test]
    fn test_cache_hit_derived_from_reads() {
        let metrics = SessionMetrics {
            tokens_input: Some(1000),
            cache_read_tokens: Some(3000),
            ..Default::default()
        };
        assert_eq!(metrics.cache_hit(), Some(0.75));

        let reported = SessionMetrics {
            cache_hit_ratio: Some(1.4),
            ..Default::default()
        };
        assert_eq!(reported.cache_hit(), Some(1.0));
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut profile = UserProfile::new("dev", Utc::now());
        for score in 0..25 {
            profile.push_history(record(score as f64), 20);
        }
        assert_eq!(profile.history.len(), 20);
        assert_eq!(profile.history.front().map(|r| r.raw_total), Some(5.0));
        assert_eq!(profile.history.back().map(|r| r.raw_total), Some(24.0));
    }

    #[test]
    fn test_legacy_payload_defaults_to_version_zero() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"cumulative_score": 1000.0}"#).unwrap();
        assert_eq!(profile.schema_version, 0);
        assert_eq!(profile.current_rank, Rank::Cadet);
    }

    #[test]
    fn test_final_total_clamped() {
        let bonuses = Bonuses {
            streak: 50.0,
            combo: 150.0,
            achievement: 400.0,
            recency: 50.0,
        };
        assert_eq!(ScoreReport::compute_final(2300.0, 1.25, &bonuses), GLOBAL_MAX);
        assert_eq!(
            ScoreReport::compute_final(-10.0, 1.0, &Bonuses::default()),
            0.0
        );
    }
}
