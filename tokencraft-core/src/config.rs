//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tokencraft/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tokencraft/` (~/.config/tokencraft/)
//! - Data: `$XDG_DATA_HOME/tokencraft/` (~/.local/share/tokencraft/)
//! - State/Logs: `$XDG_STATE_HOME/tokencraft/` (~/.local/state/tokencraft/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "tokencraft";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Progression engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Profile and snapshot storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Tunables for the progression engine.
///
/// Defaults are the rubric v3 values; overriding them is mostly useful for
/// experiments and tests.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Number of recent sessions kept on the profile
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Length of a season in days
    #[serde(default = "default_season_days")]
    pub season_days: i64,

    /// Whole days without a session before decay applies
    #[serde(default = "default_decay_threshold_days")]
    pub decay_threshold_days: i64,

    /// Fraction of the lifetime score removed by decay
    #[serde(default = "default_decay_pct")]
    pub decay_pct: f64,

    /// Uplift applied to the streak and combo bonus for a same-day improvement
    #[serde(default = "default_recency_uplift_pct")]
    pub recency_uplift_pct: f64,

    /// Number of recent final scores in the score-drop moving average
    #[serde(default = "default_score_drop_window")]
    pub score_drop_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            season_days: default_season_days(),
            decay_threshold_days: default_decay_threshold_days(),
            decay_pct: default_decay_pct(),
            recency_uplift_pct: default_recency_uplift_pct(),
            score_drop_window: default_score_drop_window(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(Error::Config(
                "engine.history_capacity must be at least 1".to_string(),
            ));
        }
        if self.season_days <= 0 {
            return Err(Error::Config(
                "engine.season_days must be positive".to_string(),
            ));
        }
        if self.decay_threshold_days <= 0 {
            return Err(Error::Config(
                "engine.decay_threshold_days must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decay_pct) {
            return Err(Error::Config(
                "engine.decay_pct must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.recency_uplift_pct) {
            return Err(Error::Config(
                "engine.recency_uplift_pct must be between 0 and 1".to_string(),
            ));
        }
        if self.score_drop_window < 2 {
            return Err(Error::Config(
                "engine.score_drop_window must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_history_capacity() -> usize {
    20
}

fn default_season_days() -> i64 {
    30
}

fn default_decay_threshold_days() -> i64 {
    31
}

fn default_decay_pct() -> f64 {
    0.5
}

fn default_recency_uplift_pct() -> f64 {
    0.25
}

fn default_score_drop_window() -> usize {
    5
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Snapshots kept per identity after each evaluation (0 keeps all)
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_retention: default_snapshot_retention(),
        }
    }
}

fn default_snapshot_retention() -> usize {
    100
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.engine.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tokencraft/config.toml` (~/.config/tokencraft/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/tokencraft/` (~/.local/share/tokencraft/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tokencraft/` (~/.local/state/tokencraft/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/tokencraft/profiles.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("profiles.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tokencraft.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// Called by the CLI before anything else reads these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
