//! Category scoring.
//!
//! Each category is a fixed definition: identifier, maximum points and a rule
//! that maps the session (plus the recent token history) to an earned share
//! in `[0, 1]`. A rule returns `None` when the metric it needs is missing,
//! which scores zero for that category.

use super::difficulty::Thresholds;
use crate::types::{Category, CategoryScore, OptimizationKind, SessionMetrics, ToolCallCounts};

/// Inputs shared by every scoring rule.
pub struct ScoringInput<'a> {
    pub metrics: &'a SessionMetrics,
    /// Token usage of preceding sessions, oldest first
    pub previous_tokens: &'a [f64],
    pub thresholds: &'a Thresholds,
}

/// One rubric category.
pub struct CategoryDefinition {
    pub category: Category,
    pub maximum: f64,
    pub rule: fn(&ScoringInput<'_>) -> Option<f64>,
}

/// The rubric, in report order.
pub const CATEGORIES: &[CategoryDefinition] = &[
    CategoryDefinition {
        category: Category::TokenEfficiency,
        maximum: 250.0,
        rule: token_efficiency,
    },
    CategoryDefinition {
        category: Category::OptimizationAdoption,
        maximum: 400.0,
        rule: optimization_adoption,
    },
    CategoryDefinition {
        category: Category::ImprovementTrend,
        maximum: 125.0,
        rule: improvement_trend,
    },
    CategoryDefinition {
        category: Category::WasteAwareness,
        maximum: 100.0,
        rule: waste_awareness,
    },
    CategoryDefinition {
        category: Category::CacheEffectiveness,
        maximum: 75.0,
        rule: cache_effectiveness,
    },
    CategoryDefinition {
        category: Category::ToolEfficiency,
        maximum: 75.0,
        rule: tool_efficiency,
    },
    CategoryDefinition {
        category: Category::CostEfficiency,
        maximum: 75.0,
        rule: cost_efficiency,
    },
    CategoryDefinition {
        category: Category::SessionFocus,
        maximum: 75.0,
        rule: session_focus,
    },
    CategoryDefinition {
        category: Category::LearningGrowth,
        maximum: 75.0,
        rule: learning_growth,
    },
    CategoryDefinition {
        category: Category::BestPractices,
        maximum: 50.0,
        rule: best_practices,
    },
];

/// Weight of each optimization practice in the adoption rate.
pub const OPTIMIZATION_WEIGHTS: &[(OptimizationKind, f64)] = &[
    (OptimizationKind::DeferDocs, 50.0),
    (OptimizationKind::ProjectInstructions, 50.0),
    (OptimizationKind::ConciseMode, 40.0),
    (OptimizationKind::DirectCommands, 60.0),
    (OptimizationKind::ContextManagement, 50.0),
    (OptimizationKind::XmlTags, 20.0),
    (OptimizationKind::ChainOfThought, 30.0),
    (OptimizationKind::Examples, 25.0),
];

const TREND_WINDOW: usize = 5;
const LEARNING_MIN_SESSIONS: usize = 10;
const NO_TREND_SHARE: f64 = 0.4;

/// Score every category and return them in rubric order.
pub fn score_session(input: &ScoringInput<'_>) -> Vec<CategoryScore> {
    CATEGORIES
        .iter()
        .map(|def| {
            let share = (def.rule)(input)
                .filter(|s| s.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            CategoryScore {
                category: def.category,
                earned: def.maximum * share,
                maximum: def.maximum,
            }
        })
        .collect()
}

pub fn raw_total(scores: &[CategoryScore]) -> f64 {
    scores.iter().map(|s| s.earned).sum()
}

/// Sum of category maximums.
pub fn max_base_points() -> f64 {
    CATEGORIES.iter().map(|c| c.maximum).sum()
}

// ============================================
// Shared curves
// ============================================

fn higher_is_better(actual: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 1.0;
    }
    (actual / target).clamp(0.0, 1.0)
}

fn lower_is_better(actual: f64, limit: f64) -> f64 {
    if actual <= limit {
        1.0
    } else if limit <= 0.0 {
        0.0
    } else {
        limit / actual
    }
}

/// Credit for a consistency rate: full from 90%, then softer bands down to a
/// linear ramp below 30%.
pub fn consistency_curve(rate: f64) -> f64 {
    let rate = rate.clamp(0.0, 1.0);
    let band = |lo: f64, hi: f64, from: f64, to: f64| from + (rate - lo) / (hi - lo) * (to - from);
    if rate >= 0.9 {
        1.0
    } else if rate >= 0.7 {
        band(0.7, 0.9, 0.85, 1.0)
    } else if rate >= 0.5 {
        band(0.5, 0.7, 0.65, 0.85)
    } else if rate >= 0.3 {
        band(0.3, 0.5, 0.40, 0.65)
    } else {
        rate / 0.3 * 0.40
    }
}

/// Percentage improvement of `recent` over `baseline` (lower usage is better).
fn percent_reduction(baseline: f64, recent: f64) -> Option<f64> {
    (baseline > 0.0).then(|| (baseline - recent) / baseline * 100.0)
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn ratio(part: i64, whole: i64) -> Option<f64> {
    (whole > 0).then(|| part.max(0) as f64 / whole as f64)
}

// ============================================
// Rules
// ============================================

fn token_efficiency(input: &ScoringInput<'_>) -> Option<f64> {
    let used = input.metrics.tokens_used()?;
    let t = input.thresholds.factor;
    let ratio = used / input.thresholds.token_budget;

    if ratio <= 1.0 {
        return Some(1.0);
    }
    let share = (1.0 + 1.0 / ratio).log2();
    // Over budget: higher ranks lose more of the curve
    let tightening = if ratio <= 1.5 { t } else { t.powf(1.5) };
    Some(share * tightening)
}

fn optimization_adoption(input: &ScoringInput<'_>) -> Option<f64> {
    let applied = input.metrics.optimizations.as_ref()?;
    let total: f64 = OPTIMIZATION_WEIGHTS.iter().map(|(_, w)| w).sum();
    let earned: f64 = OPTIMIZATION_WEIGHTS
        .iter()
        .filter(|(kind, _)| applied.contains(kind))
        .map(|(_, w)| w)
        .sum();
    let rate = earned / total;

    Some(consistency_curve(rate) * higher_is_better(rate, input.thresholds.adoption_target))
}

fn improvement_trend(input: &ScoringInput<'_>) -> Option<f64> {
    let current = input.metrics.tokens_used()?;
    let start = input.previous_tokens.len().saturating_sub(TREND_WINDOW);
    let Some(average) = mean(&input.previous_tokens[start..]) else {
        return Some(NO_TREND_SHARE);
    };
    let improvement = percent_reduction(average, current)?;

    Some(match improvement {
        i if i >= 10.0 => 1.0,
        i if i >= 5.0 => 0.8,
        i if i >= 2.0 => 0.4,
        i if i >= 0.0 => 0.16,
        _ => 0.0,
    })
}

fn waste_awareness(input: &ScoringInput<'_>) -> Option<f64> {
    let wasted = input.metrics.tokens_wasted?.max(0) as f64;
    let used = input.metrics.tokens_used()?;
    if used <= 0.0 {
        return Some(if wasted > 0.0 { 0.0 } else { 1.0 });
    }
    Some(lower_is_better(wasted / used, input.thresholds.waste_allowance))
}

fn cache_effectiveness(input: &ScoringInput<'_>) -> Option<f64> {
    let hit = input.metrics.cache_hit()?;
    Some(higher_is_better(hit, input.thresholds.cache_target))
}

const READ_BEFORE_EDIT_POINTS: f64 = 30.0;
const PARALLEL_POINTS: f64 = 25.0;
const SEARCH_POINTS: f64 = 20.0;

fn tool_efficiency(input: &ScoringInput<'_>) -> Option<f64> {
    let tools: &ToolCallCounts = input.metrics.tools.as_ref()?;

    let read_first = ratio(tools.edits_after_read, tools.edits)
        .map(|r| higher_is_better(r, 0.9))
        .unwrap_or(1.0);
    let parallel = ratio(tools.parallel_turns, tools.tool_turns)
        .map(|r| higher_is_better(r, 0.4))
        .unwrap_or(0.5);
    let searches = tools
        .dedicated_searches
        .max(0)
        .saturating_add(tools.shell_searches.max(0));
    let search = ratio(tools.dedicated_searches, searches)
        .map(|r| higher_is_better(r, 0.9))
        .unwrap_or(1.0);

    let points =
        read_first * READ_BEFORE_EDIT_POINTS + parallel * PARALLEL_POINTS + search * SEARCH_POINTS;
    Some(points / (READ_BEFORE_EDIT_POINTS + PARALLEL_POINTS + SEARCH_POINTS))
}

fn cost_efficiency(input: &ScoringInput<'_>) -> Option<f64> {
    let cost = input.metrics.cost_usd.filter(|c| c.is_finite())?.max(0.0);
    Some(lower_is_better(cost, input.thresholds.cost_budget_usd))
}

fn session_focus(input: &ScoringInput<'_>) -> Option<f64> {
    let count = input.metrics.message_count?.max(0) as f64;
    let min = input.thresholds.focus_min_messages;
    let max = input.thresholds.focus_max_messages;

    Some(if count < min {
        count / min
    } else if count > max {
        max / count
    } else {
        1.0
    })
}

fn learning_growth(input: &ScoringInput<'_>) -> Option<f64> {
    let current = input.metrics.tokens_used()?;
    let mut series: Vec<f64> = input.previous_tokens.to_vec();
    series.push(current);
    if series.len() < LEARNING_MIN_SESSIONS {
        return None;
    }

    let third = series.len() / 3;
    let early = mean(&series[..third])?;
    let recent = mean(&series[series.len() - third..])?;
    let growth = percent_reduction(early, recent)?;

    Some(match growth {
        g if g >= 20.0 => 1.0,
        g if g >= 10.0 => 0.8,
        g if g >= 5.0 => 0.6,
        g if g >= 0.0 => 0.4,
        _ => 0.0,
    })
}

fn best_practices(input: &ScoringInput<'_>) -> Option<f64> {
    let setup = input.metrics.setup?;
    let instructed = ratio(setup.instructed_projects, setup.top_projects)
        .unwrap_or(0.0)
        .min(1.0);

    let mut points = 30.0 * instructed;
    if setup.memory_notes {
        points += 10.0;
    }
    if setup.custom_tooling {
        points += 10.0;
    }
    Some(points / 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::difficulty::thresholds_for;
    use crate::types::{Rank, SetupChecks, MAX_BASE_POINTS};

    fn strong_session() -> SessionMetrics {
        SessionMetrics {
            tokens_input: Some(12_000),
            tokens_output: Some(3_000),
            tokens_wasted: Some(500),
            cache_hit_ratio: Some(0.9),
            optimizations: Some(OPTIMIZATION_WEIGHTS.iter().map(|(k, _)| *k).collect()),
            message_count: Some(8),
            tools: Some(ToolCallCounts {
                edits_after_read: 10,
                edits: 10,
                parallel_turns: 5,
                tool_turns: 10,
                dedicated_searches: 9,
                shell_searches: 1,
            }),
            cost_usd: Some(0.10),
            setup: Some(SetupChecks {
                instructed_projects: 3,
                top_projects: 3,
                memory_notes: true,
                custom_tooling: true,
            }),
            ..Default::default()
        }
    }

    fn score(metrics: &SessionMetrics, previous: &[f64], rank: Rank) -> Vec<CategoryScore> {
        let thresholds = thresholds_for(rank, None);
        score_session(&ScoringInput {
            metrics,
            previous_tokens: previous,
            thresholds: &thresholds,
        })
    }

    fn earned(scores: &[CategoryScore], category: Category) -> f64 {
        scores
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.earned)
            .unwrap()
    }

    #[test]
    fn test_rubric_totals_2300() {
        assert_eq!(max_base_points(), MAX_BASE_POINTS);
        assert_eq!(CATEGORIES.len(), 10);
    }

    #[test]
    fn test_missing_metrics_score_zero() {
        let scores = score(&SessionMetrics::default(), &[], Rank::Cadet);
        assert_eq!(raw_total(&scores), 0.0);
        assert!(scores.iter().all(|s| s.maximum > 0.0));
    }

    #[test]
    fn test_earned_within_bounds() {
        let sessions = [
            strong_session(),
            SessionMetrics {
                tokens_input: Some(-400),
                tokens_output: Some(900_000),
                tokens_wasted: Some(2_000_000),
                cache_hit_ratio: Some(-3.0),
                message_count: Some(400),
                cost_usd: Some(f64::NAN),
                ..Default::default()
            },
        ];
        for metrics in &sessions {
            for rank in Rank::ALL {
                for s in score(metrics, &[50_000.0, 40_000.0], rank) {
                    assert!(s.earned >= 0.0 && s.earned <= s.maximum, "{:?}", s);
                }
            }
        }
    }

    #[test]
    fn test_token_efficiency_curve() {
        let within = SessionMetrics {
            tokens_input: Some(30_000),
            ..Default::default()
        };
        assert_eq!(
            earned(&score(&within, &[], Rank::Cadet), Category::TokenEfficiency),
            250.0
        );

        // Double the Cadet budget: log2(1.5) of the maximum
        let doubled = SessionMetrics {
            tokens_input: Some(70_000),
            ..Default::default()
        };
        let points = earned(&score(&doubled, &[], Rank::Cadet), Category::TokenEfficiency);
        assert!((points - 250.0 * 1.5f64.log2()).abs() < 1e-9);

        // The same usage earns less at a higher rank
        let captain = earned(&score(&within, &[], Rank::Captain), Category::TokenEfficiency);
        assert!(captain < 250.0);
    }

    #[test]
    fn test_consistency_curve_bands() {
        assert_eq!(consistency_curve(0.95), 1.0);
        assert!((consistency_curve(0.7) - 0.85).abs() < 1e-9);
        assert!((consistency_curve(0.5) - 0.65).abs() < 1e-9);
        assert!((consistency_curve(0.3) - 0.40).abs() < 1e-9);
        assert!((consistency_curve(0.15) - 0.20).abs() < 1e-9);
        assert_eq!(consistency_curve(0.0), 0.0);
    }

    #[test]
    fn test_full_adoption_earns_maximum() {
        let scores = score(&strong_session(), &[], Rank::GalacticLegend);
        assert_eq!(earned(&scores, Category::OptimizationAdoption), 400.0);
    }

    #[test]
    fn test_improvement_trend_tiers() {
        let metrics = SessionMetrics {
            tokens_input: Some(9_000),
            ..Default::default()
        };
        // No history is neutral
        assert_eq!(
            earned(&score(&metrics, &[], Rank::Cadet), Category::ImprovementTrend),
            50.0
        );
        // 10% below the trailing average
        assert_eq!(
            earned(&score(&metrics, &[10_000.0], Rank::Cadet), Category::ImprovementTrend),
            125.0
        );
        // Worse than the average
        assert_eq!(
            earned(&score(&metrics, &[8_000.0], Rank::Cadet), Category::ImprovementTrend),
            0.0
        );
    }

    #[test]
    fn test_learning_growth_needs_ten_sessions() {
        let metrics = SessionMetrics {
            tokens_input: Some(5_000),
            ..Default::default()
        };
        let short = vec![10_000.0; 5];
        assert_eq!(
            earned(&score(&metrics, &short, Rank::Cadet), Category::LearningGrowth),
            0.0
        );

        let long = vec![
            10_000.0, 10_000.0, 10_000.0, 9_000.0, 8_000.0, 7_000.0, 6_000.0, 5_000.0, 5_000.0,
        ];
        assert_eq!(
            earned(&score(&metrics, &long, Rank::Cadet), Category::LearningGrowth),
            75.0
        );
    }

    #[test]
    fn test_tool_efficiency_without_edits() {
        let metrics = SessionMetrics {
            tools: Some(ToolCallCounts {
                parallel_turns: 4,
                tool_turns: 10,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            earned(&score(&metrics, &[], Rank::Cadet), Category::ToolEfficiency),
            75.0
        );
    }

    #[test]
    fn test_huge_counts_do_not_overflow() {
        let metrics = SessionMetrics {
            tokens_input: Some(i64::MAX),
            tokens_output: Some(1),
            tools: Some(ToolCallCounts {
                dedicated_searches: i64::MAX,
                shell_searches: 1,
                ..Default::default()
            }),
            ..Default::default()
        };
        let scores = score(&metrics, &[], Rank::Cadet);
        assert!(earned(&scores, Category::TokenEfficiency) < 1.0);
        let tools = earned(&scores, Category::ToolEfficiency);
        assert!(tools > 0.0 && tools <= 75.0);
    }

    #[test]
    fn test_session_focus_range() {
        let focus = |count| {
            let metrics = SessionMetrics {
                message_count: Some(count),
                ..Default::default()
            };
            earned(&score(&metrics, &[], Rank::Cadet), Category::SessionFocus)
        };
        assert_eq!(focus(1), 37.5);
        assert_eq!(focus(10), 75.0);
        assert_eq!(focus(30), 37.5);
    }
}
