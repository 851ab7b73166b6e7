//! # tokencraft-core
//!
//! Scoring and progression engine for Token Craft.
//!
//! This library provides:
//! - Domain types for session metrics, score reports and profiles
//! - The progression engine: category scoring, rank-scaled difficulty,
//!   streaks, combos, time mechanics, achievements, regression detection
//!   and rubric migration
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokencraft_core::{Config, Database, ProgressionEngine, SessionMetrics};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let engine = ProgressionEngine::new(config.engine.clone()).expect("invalid engine config");
//! let previous = db.load_profile("me").expect("failed to load profile");
//! let session = SessionMetrics {
//!     tokens_input: Some(18_000),
//!     ..Default::default()
//! };
//! let evaluation = engine
//!     .evaluate("me", previous.clone(), &[session.clone()])
//!     .expect("evaluation failed");
//! db.record_evaluation(previous.as_ref(), &evaluation, &session, 100)
//!     .expect("failed to save");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use progression::{Evaluation, MigrationReport, ProgressionEngine};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod progression;
pub mod types;
