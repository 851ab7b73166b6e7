//! Scoring and progression engine
//!
//! Component modules are pure functions over explicit inputs:
//! - [`scoring`] computes the ten category scores for one session
//! - [`difficulty`] derives rank-scaled thresholds
//! - [`streak`], [`combo`] and [`time_mechanics`] adjust the raw total
//! - [`achievements`] evaluates the unlock registry
//! - [`regression`] flags declining performance
//! - [`migration`] upgrades profiles written by older rubrics
//!
//! [`orchestrator`] composes them into a single [`ProgressionEngine::evaluate`]
//! call and is the only place a profile is mutated.

pub mod achievements;
pub mod combo;
pub mod delta;
pub mod difficulty;
pub mod migration;
pub mod orchestrator;
pub mod rank;
pub mod regression;
pub mod scoring;
pub mod streak;
pub mod time_mechanics;

pub use achievements::{AchievementDefinition, AchievementStats, AchievementStatus, REGISTRY};
pub use delta::{RankMovement, SnapshotDelta};
pub use difficulty::Thresholds;
pub use migration::MigrationReport;
pub use orchestrator::{Evaluation, ProgressionEngine};
pub use rank::RankProgress;
