//! Consecutive-improvement streaks.

use serde::Serialize;

/// A streak breakpoint: from `length` on, `multiplier` applies; `bonus` is
/// paid once per run when the breakpoint is first reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub length: u32,
    pub multiplier: f64,
    pub bonus: f64,
}

pub const BREAKPOINTS: &[Breakpoint] = &[
    Breakpoint {
        length: 3,
        multiplier: 1.10,
        bonus: 20.0,
    },
    Breakpoint {
        length: 4,
        multiplier: 1.15,
        bonus: 30.0,
    },
    Breakpoint {
        length: 5,
        multiplier: 1.20,
        bonus: 40.0,
    },
    Breakpoint {
        length: 6,
        multiplier: 1.25,
        bonus: 50.0,
    },
];

/// Streak state carried on the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreakState {
    pub length: u32,
    /// Raw total of the previous session
    pub last_score: Option<f64>,
    /// Highest breakpoint length already rewarded in this run
    pub rewarded_through: u32,
}

/// Streak after scoring one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreakOutcome {
    pub length: u32,
    pub multiplier: f64,
    /// One-time bonus earned by this session
    pub bonus: f64,
    pub rewarded_through: u32,
    pub broken: bool,
}

/// Multiplier for a streak of `length`.
pub fn multiplier_for(length: u32) -> f64 {
    BREAKPOINTS
        .iter()
        .rev()
        .find(|b| length >= b.length)
        .map(|b| b.multiplier)
        .unwrap_or(1.0)
}

/// Advance the streak with this session's raw score.
///
/// An equal score extends the streak. The first session ever starts a run
/// of one.
pub fn advance(state: &StreakState, score: f64) -> StreakOutcome {
    let extends = state.last_score.map_or(true, |last| score >= last);

    if !extends {
        tracing::debug!(previous = state.length, "Streak broken");
        return StreakOutcome {
            length: 0,
            multiplier: 1.0,
            bonus: 0.0,
            rewarded_through: 0,
            broken: state.length > 0,
        };
    }

    let length = state.length.saturating_add(1);
    let mut rewarded_through = state.rewarded_through;
    let mut bonus = 0.0;
    for bp in BREAKPOINTS {
        if length >= bp.length && bp.length > rewarded_through {
            bonus += bp.bonus;
            rewarded_through = bp.length;
        }
    }

    if bonus > 0.0 {
        tracing::info!(length, bonus, "Streak breakpoint reached");
    }

    StreakOutcome {
        length,
        multiplier: multiplier_for(length),
        bonus,
        rewarded_through,
        broken: false,
    }
}
