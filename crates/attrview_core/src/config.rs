//! Process configuration read from the environment.
//!
//! # Responsibility
//! - Resolve the database location and optional logging settings.
//! - Provide one entry point for hosts to open storage and start logging.
//!
//! # Invariants
//! - Blank environment values are treated as unset.
//! - Logging stays disabled unless a log directory is configured.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{default_log_level, init_logging, LoggingConfig};
use rusqlite::Connection;
use std::path::PathBuf;

/// Path of the SQLite database; in-memory storage when unset.
pub const ENV_DB_PATH: &str = "ATTRVIEW_DB_PATH";
/// Log level; build-mode default when unset.
pub const ENV_LOG_LEVEL: &str = "ATTRVIEW_LOG_LEVEL";
/// Absolute log directory; logging disabled when unset.
pub const ENV_LOG_DIR: &str = "ATTRVIEW_LOG_DIR";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: Option<PathBuf>,
    pub logging: Option<LoggingConfig>,
}

impl CoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let logging = read(ENV_LOG_DIR).map(|dir| {
            let level = read(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string());
            LoggingConfig::new(level, dir)
        });

        Self {
            db_path: read(ENV_DB_PATH).map(PathBuf::from),
            logging,
        }
    }

    /// Opens the configured database with all migrations applied.
    pub fn open_db(&self) -> DbResult<Connection> {
        match &self.db_path {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }

    /// Starts logging when configured. Returns whether logging is active.
    pub fn init_logging(&self) -> Result<bool, String> {
        match &self.logging {
            Some(config) => init_logging(config).map(|()| true),
            None => Ok(false),
        }
    }
}
