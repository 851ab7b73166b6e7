//! Database layer for tokencraft
//!
//! SQLite storage for profiles and evaluation snapshots:
//! - Schema migrations
//! - Compare-and-swap profile writes
//! - Append-only snapshots with retention

pub mod repo;
pub mod schema;

pub use repo::Database;
