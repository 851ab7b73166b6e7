//! Change between two score reports, typically consecutive snapshots.

use crate::types::{Category, Rank, ScoreReport};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMovement {
    Promoted,
    Demoted,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryDelta {
    pub category: Category,
    pub before: f64,
    pub after: f64,
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotDelta {
    pub final_change: f64,
    pub lifetime_change: f64,
    pub rank_before: Rank,
    pub rank_after: Rank,
    pub movement: RankMovement,
    /// Categories present in both reports, in the newer report's order
    pub categories: Vec<CategoryDelta>,
}

impl SnapshotDelta {
    /// Categories with the largest gains first.
    pub fn top_gains(&self, n: usize) -> Vec<CategoryDelta> {
        let mut gains: Vec<CategoryDelta> = self
            .categories
            .iter()
            .copied()
            .filter(|c| c.change > 0.0)
            .collect();
        gains.sort_by(|a, b| b.change.total_cmp(&a.change));
        gains.truncate(n);
        gains
    }
}

pub fn compare(before: &ScoreReport, after: &ScoreReport) -> SnapshotDelta {
    let movement = match after.rank.cmp(&before.rank) {
        std::cmp::Ordering::Greater => RankMovement::Promoted,
        std::cmp::Ordering::Less => RankMovement::Demoted,
        std::cmp::Ordering::Equal => RankMovement::Unchanged,
    };

    let categories = after
        .categories
        .iter()
        .filter_map(|now| {
            let then = before.category(now.category)?;
            Some(CategoryDelta {
                category: now.category,
                before: then.earned,
                after: now.earned,
                change: now.earned - then.earned,
            })
        })
        .collect();

    SnapshotDelta {
        final_change: after.final_total - before.final_total,
        lifetime_change: after.lifetime_score - before.lifetime_score,
        rank_before: before.rank,
        rank_after: after.rank,
        movement,
        categories,
    }
}
