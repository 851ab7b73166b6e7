//! Error types for tokencraft-core

use thiserror::Error;

/// Main error type for the tokencraft-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persisted profile payload could not be decoded
    ///
    /// Progression is never silently reset; the caller decides whether to
    /// back the payload up and start over.
    #[error("profile for {identity} is unreadable: {reason}")]
    ProfileUnreadable { identity: String, reason: String },

    /// Profile was written by a newer rubric than this build understands
    #[error("unsupported profile schema version {found} (current is {current})")]
    UnsupportedSchemaVersion { found: u32, current: u32 },

    /// A write would lower the stored schema version
    #[error("refusing to downgrade profile {identity} from schema {stored} to {attempted}")]
    SchemaDowngrade {
        identity: String,
        stored: u32,
        attempted: u32,
    },

    /// The stored profile changed between load and save
    #[error("profile {identity} was modified by another evaluation")]
    ConcurrentModification { identity: String },

    /// Evaluation was requested with an empty session sequence
    #[error("no sessions to evaluate")]
    NoSessions,
}

/// Result type alias for tokencraft-core
pub type Result<T> = std::result::Result<T, Error>;
