//! Combo bonus for several categories at excellence in one session.

use crate::types::CategoryScore;
use serde::Serialize;

/// Share of a category's maximum that counts toward a combo.
pub const COMBO_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComboTier {
    pub min_categories: usize,
    pub bonus: f64,
    pub name: &'static str,
}

/// Sorted by `min_categories`.
pub const COMBO_TIERS: &[ComboTier] = &[
    ComboTier {
        min_categories: 2,
        bonus: 25.0,
        name: "Focused",
    },
    ComboTier {
        min_categories: 3,
        bonus: 50.0,
        name: "Well-Rounded",
    },
    ComboTier {
        min_categories: 4,
        bonus: 100.0,
        name: "Proficiency",
    },
    ComboTier {
        min_categories: 5,
        bonus: 150.0,
        name: "Mastery",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComboOutcome {
    pub qualifying: usize,
    pub tier: Option<ComboTier>,
    pub bonus: f64,
}

pub fn evaluate(scores: &[CategoryScore]) -> ComboOutcome {
    let qualifying = scores
        .iter()
        .filter(|s| s.maximum > 0.0 && s.fraction() >= COMBO_THRESHOLD)
        .count();
    let tier = COMBO_TIERS
        .iter()
        .rev()
        .find(|t| qualifying >= t.min_categories)
        .copied();

    ComboOutcome {
        qualifying,
        tier,
        bonus: tier.map_or(0.0, |t| t.bonus),
    }
}
