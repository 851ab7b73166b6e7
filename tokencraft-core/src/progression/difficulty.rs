//! Rank-adjusted thresholds.
//!
//! Every rank derives a tightening factor `t` from a small set of anchor
//! points, linearly interpolated by rank index. Lower-is-better limits
//! (token budget, waste allowance, cost budget, message ceiling) are
//! multiplied by `t`. Higher-is-better targets keep their floor but have
//! their slack `1 - target` multiplied by `t`.

use crate::types::{DifficultyRelief, Rank};
use serde::Serialize;

/// (rank index, tightening factor) anchors, sorted by index.
const ANCHORS: &[(usize, f64)] = &[(0, 1.00), (4, 0.80), (9, 0.57)];

const BASE_TOKEN_BUDGET: f64 = 35_000.0;
const BASE_ADOPTION_TARGET: f64 = 0.30;
const BASE_CACHE_TARGET: f64 = 0.50;
const BASE_WASTE_ALLOWANCE: f64 = 0.30;
const BASE_COST_BUDGET_USD: f64 = 0.27;
const BASE_FOCUS_MAX_MESSAGES: f64 = 15.0;
const FOCUS_MIN_MESSAGES: f64 = 2.0;

/// Thresholds used to score one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub rank: Rank,
    pub factor: f64,
    /// Tokens per session at or below which efficiency is full
    pub token_budget: f64,
    /// Adoption rate for full adoption credit
    pub adoption_target: f64,
    pub cache_target: f64,
    /// Wasted/used token ratio tolerated without penalty
    pub waste_allowance: f64,
    pub cost_budget_usd: f64,
    pub focus_min_messages: f64,
    pub focus_max_messages: f64,
}

/// Tightening factor for a rank index. Out-of-range indices clamp.
pub fn tightening_factor(rank_index: usize) -> f64 {
    let last = ANCHORS[ANCHORS.len() - 1];
    let index = rank_index.min(last.0);

    for pair in ANCHORS.windows(2) {
        let (lo_idx, lo) = pair[0];
        let (hi_idx, hi) = pair[1];
        if index <= hi_idx {
            let span = (hi_idx - lo_idx) as f64;
            let pos = (index - lo_idx) as f64;
            return lo + (hi - lo) * pos / span;
        }
    }
    last.1
}

/// Thresholds for `rank`, optionally eased by an active relief.
///
/// Relief loosens the factor but never past the baseline.
pub fn thresholds_for(rank: Rank, relief: Option<&DifficultyRelief>) -> Thresholds {
    let mut factor = tightening_factor(rank.index());
    if let Some(relief) = relief {
        factor = (factor * (1.0 + relief.easing.max(0.0))).min(1.0);
    }
    thresholds_with_factor(rank, factor)
}

fn thresholds_with_factor(rank: Rank, factor: f64) -> Thresholds {
    let tighten_target = |base: f64| 1.0 - (1.0 - base) * factor;

    Thresholds {
        rank,
        factor,
        token_budget: BASE_TOKEN_BUDGET * factor,
        adoption_target: tighten_target(BASE_ADOPTION_TARGET),
        cache_target: tighten_target(BASE_CACHE_TARGET),
        waste_allowance: BASE_WASTE_ALLOWANCE * factor,
        cost_budget_usd: BASE_COST_BUDGET_USD * factor,
        focus_min_messages: FOCUS_MIN_MESSAGES,
        focus_max_messages: (BASE_FOCUS_MAX_MESSAGES * factor).max(FOCUS_MIN_MESSAGES),
    }
}

/// Thresholds for every rank, lowest first.
pub fn comparison_table() -> Vec<Thresholds> {
    Rank::ALL
        .into_iter()
        .map(|rank| thresholds_for(rank, None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_anchor_values() {
        assert_eq!(tightening_factor(0), 1.0);
        assert!((tightening_factor(4) - 0.80).abs() < 1e-9);
        assert!((tightening_factor(9) - 0.57).abs() < 1e-9);
    }

    #[test]
    fn test_interpolated_between_anchors() {
        assert!((tightening_factor(2) - 0.90).abs() < 1e-9);
        // 0.80 + (0.57 - 0.80) * 3/5
        assert!((tightening_factor(7) - 0.662).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_index_clamps() {
        assert_eq!(tightening_factor(42), tightening_factor(9));
    }

    #[test]
    fn test_monotonic_tightening() {
        let table = comparison_table();
        for pair in table.windows(2) {
            assert!(pair[1].factor < pair[0].factor);
            assert!(pair[1].token_budget < pair[0].token_budget);
            assert!(pair[1].adoption_target > pair[0].adoption_target);
            assert!(pair[1].cache_target > pair[0].cache_target);
        }
    }

    #[test]
    fn test_legend_is_43_percent_tighter() {
        let base = thresholds_for(Rank::Cadet, None);
        let legend = thresholds_for(Rank::GalacticLegend, None);
        let tightening = 1.0 - legend.token_budget / base.token_budget;
        assert!((tightening - 0.43).abs() < 1e-9);
        assert!((legend.token_budget - 19_950.0).abs() < 1e-6);
    }

    #[test]
    fn test_relief_eases_but_not_past_baseline() {
        let until = Utc::now() + Duration::days(7);
        let relief = DifficultyRelief {
            easing: 0.15,
            until,
        };
        let eased = thresholds_for(Rank::GalacticLegend, Some(&relief));
        assert!((eased.factor - 0.57 * 1.15).abs() < 1e-9);

        let cadet = thresholds_for(Rank::Cadet, Some(&relief));
        assert_eq!(cadet.factor, 1.0);
    }
}
