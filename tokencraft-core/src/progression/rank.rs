//! Rank lookup over the lifetime score.

use crate::types::Rank;
use serde::Serialize;

/// Minimum lifetime score for each rank, lowest first.
pub const RANK_THRESHOLDS: &[(f64, Rank)] = &[
    (0.0, Rank::Cadet),
    (100.0, Rank::Navigator),
    (200.0, Rank::Pilot),
    (350.0, Rank::Explorer),
    (550.0, Rank::Captain),
    (800.0, Rank::Commander),
    (1100.0, Rank::Admiral),
    (1450.0, Rank::Commodore),
    (1850.0, Rank::FleetAdmiral),
    (2300.0, Rank::GalacticLegend),
];

/// Where a score sits within the rank ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankProgress {
    pub rank: Rank,
    pub next: Option<Rank>,
    /// Points still needed for `next` (0 at the top rank)
    pub distance: f64,
    /// Progress through the current tier, 0-100
    pub percent: f64,
}

/// Highest rank whose threshold `score` meets. Negative scores map to the lowest rank.
pub fn rank_for_score(score: f64) -> Rank {
    let idx = RANK_THRESHOLDS.partition_point(|(min, _)| *min <= score);
    RANK_THRESHOLDS[idx.saturating_sub(1)].1
}

/// Minimum score for `rank`.
pub fn threshold(rank: Rank) -> f64 {
    RANK_THRESHOLDS[rank.index()].0
}

pub fn next_rank(rank: Rank) -> Option<Rank> {
    Rank::ALL.get(rank.index() + 1).copied()
}

/// Points between `score` and the next rank; 0 at the top rank.
pub fn next_rank_distance(score: f64) -> f64 {
    match next_rank(rank_for_score(score)) {
        Some(next) => (threshold(next) - score.max(0.0)).max(0.0),
        None => 0.0,
    }
}

pub fn progress(score: f64) -> RankProgress {
    let rank = rank_for_score(score);
    let next = next_rank(rank);
    let percent = match next {
        Some(next) => {
            let floor = threshold(rank);
            let span = threshold(next) - floor;
            ((score.max(0.0) - floor) / span * 100.0).clamp(0.0, 100.0)
        }
        None => 100.0,
    };

    RankProgress {
        rank,
        next,
        distance: next_rank_distance(score),
        percent,
    }
}
