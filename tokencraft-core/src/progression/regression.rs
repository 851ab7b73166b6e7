//! Regression detection over the recent session history.
//!
//! Three independent signals are combined into a severity:
//! - severe: all three trigger, or the decline run reaches [`SEVERE_DECLINE_COUNT`]
//! - moderate: two trigger
//! - minor: one triggers
//!
//! Detection is read-only. The caller stores the decline count and any
//! difficulty relief on the profile.

use crate::types::{
    DifficultyRelief, RegressionKind, RegressionSignal, RegressionVerdict, SessionRecord, Severity,
};
use chrono::{DateTime, Duration, Utc};

/// Relative drop from the personal-best efficiency that triggers.
pub const EFFICIENCY_DROP_THRESHOLD: f64 = 0.05;
/// Relative drop from the trailing average final score that triggers.
pub const SCORE_DROP_THRESHOLD: f64 = 0.10;
pub const DECLINE_COUNT_THRESHOLD: u32 = 3;
pub const SEVERE_DECLINE_COUNT: u32 = 5;
/// Final scores needed before the score-drop signal is computed.
const MIN_SCORE_HISTORY: usize = 2;

/// What the detector looks at for one evaluation.
pub struct RegressionInput<'a> {
    /// Previous sessions, oldest first
    pub history: &'a [SessionRecord],
    /// Best efficiency before this session
    pub best_efficiency: Option<f64>,
    pub current_efficiency: Option<f64>,
    pub current_final: f64,
    /// Final scores averaged for the score-drop signal
    pub window: usize,
}

pub fn detect(input: &RegressionInput<'_>) -> RegressionVerdict {
    let efficiency = efficiency_drop(input);
    let score = score_drop(input);
    let decline_count = consecutive_declines(input.history, input.current_final);
    let decline = RegressionSignal {
        kind: RegressionKind::ConsecutiveDecline,
        magnitude: decline_count as f64,
        triggered: decline_count >= DECLINE_COUNT_THRESHOLD,
    };

    let signals = vec![efficiency, score, decline];
    let triggered = signals.iter().filter(|s| s.triggered).count();
    let severity = if triggered == 3 || decline_count >= SEVERE_DECLINE_COUNT {
        Severity::Severe
    } else if triggered == 2 {
        Severity::Moderate
    } else if triggered == 1 {
        Severity::Minor
    } else {
        Severity::None
    };

    if severity != Severity::None {
        tracing::info!(
            severity = severity.as_str(),
            decline_count,
            triggered,
            "Regression detected"
        );
    }

    let recommendations = signals
        .iter()
        .filter(|s| s.triggered)
        .map(recommendation)
        .collect();

    RegressionVerdict {
        severity,
        signals,
        guidance: guidance(severity).to_string(),
        recommendations,
        decline_count,
    }
}

fn efficiency_drop(input: &RegressionInput<'_>) -> RegressionSignal {
    let magnitude = match (input.best_efficiency, input.current_efficiency) {
        (Some(best), Some(current)) if best > 0.0 => ((best - current) / best).max(0.0),
        _ => 0.0,
    };
    RegressionSignal {
        kind: RegressionKind::EfficiencyDrop,
        magnitude,
        triggered: magnitude >= EFFICIENCY_DROP_THRESHOLD,
    }
}

fn score_drop(input: &RegressionInput<'_>) -> RegressionSignal {
    let start = input.history.len().saturating_sub(input.window.max(1));
    let recent = &input.history[start..];

    let magnitude = if recent.len() < MIN_SCORE_HISTORY {
        0.0
    } else {
        let average = recent.iter().map(|r| r.final_total).sum::<f64>() / recent.len() as f64;
        if average > 0.0 {
            ((average - input.current_final) / average).max(0.0)
        } else {
            0.0
        }
    };
    RegressionSignal {
        kind: RegressionKind::ScoreDrop,
        magnitude,
        triggered: magnitude >= SCORE_DROP_THRESHOLD,
    }
}

/// Length of the strictly decreasing run of final scores ending at `current`.
pub fn consecutive_declines(history: &[SessionRecord], current: f64) -> u32 {
    let mut count = 0;
    let mut later = current;
    for record in history.iter().rev() {
        if later < record.final_total {
            count += 1;
            later = record.final_total;
        } else {
            break;
        }
    }
    count
}

/// Static guidance for a severity.
pub fn guidance(severity: Severity) -> &'static str {
    match severity {
        Severity::None => "Performance is stable. Keep it up.",
        Severity::Minor => {
            "A small dip. Review what changed in your last session before it becomes a habit."
        }
        Severity::Moderate => {
            "Performance is slipping on several fronts. Revisit the practices that earned your best sessions."
        }
        Severity::Severe => {
            "Significant regression. Go back to basics: short focused sessions, read before editing, and keep context lean."
        }
    }
}

fn recommendation(signal: &RegressionSignal) -> String {
    match signal.kind {
        RegressionKind::EfficiencyDrop => format!(
            "Token efficiency is {:.0}% below your best. Trim context and prefer targeted reads.",
            signal.magnitude * 100.0
        ),
        RegressionKind::ScoreDrop => format!(
            "Score is {:.0}% below your recent average. Compare this session with your last strong one.",
            signal.magnitude * 100.0
        ),
        RegressionKind::ConsecutiveDecline => format!(
            "{} sessions in a row have declined. Take a short break and reset your approach.",
            signal.magnitude as u32
        ),
    }
}

/// Temporary easing granted for a verdict, if any.
///
/// Moderate regressions ease thresholds by 5% for a week, severe ones by
/// 15% for two weeks.
pub fn relief_for(severity: Severity, now: DateTime<Utc>) -> Option<DifficultyRelief> {
    let (easing, days) = match severity {
        Severity::Moderate => (0.05, 7),
        Severity::Severe => (0.15, 14),
        Severity::None | Severity::Minor => return None,
    };
    Some(DifficultyRelief {
        easing,
        until: now + Duration::days(days),
    })
}
