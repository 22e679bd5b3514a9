//! Configuration module for raft-migrate
//!
//! Loads configuration from TOML, with defaults for every value so an empty
//! (or absent) file yields the standard data-directory layout.

use std::path::{Component, Path};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Names of the directories and files inside the data directory
    pub layout: LayoutConfig,

    /// Migration engine tuning
    pub migration: MigrationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;
        self.migration.validate()?;
        Ok(())
    }
}

/// On-disk layout of the raft state inside a data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Raft sub-directory of the data directory
    pub raft_dir: String,

    /// Legacy LMDB environment directory, relative to `raft_dir`
    pub legacy_dir: String,

    /// Where the legacy directory is moved after a successful migration
    pub backup_dir: String,

    /// Destination SQLite file, relative to `raft_dir`
    pub destination_file: String,

    /// Suffix appended to `destination_file` while the copy is in progress
    pub temp_suffix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            raft_dir: "raft".to_string(),
            legacy_dir: "mdb".to_string(),
            backup_dir: "mdb.backup".to_string(),
            destination_file: "raft.db".to_string(),
            temp_suffix: ".tmp".to_string(),
        }
    }
}

impl LayoutConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("layout.raft_dir", &self.raft_dir),
            ("layout.legacy_dir", &self.legacy_dir),
            ("layout.backup_dir", &self.backup_dir),
            ("layout.destination_file", &self.destination_file),
        ] {
            if !is_single_component(value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be a single path component, got {value:?}"
                )));
            }
        }

        if self.temp_suffix.is_empty() || self.temp_suffix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(
                "layout.temp_suffix must be non-empty and contain no separators".to_string(),
            ));
        }

        let names = [
            &self.legacy_dir,
            &self.backup_dir,
            &self.destination_file,
        ];
        for (i, a) in names.iter().enumerate() {
            if names[i + 1..].contains(a) {
                return Err(ConfigError::Invalid(format!(
                    "layout entries must be distinct, {a:?} is used twice"
                )));
            }
        }

        Ok(())
    }
}

fn is_single_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Migration engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Compare the destination's index bounds against the legacy store
    /// before the destination file is put in place
    pub verify_after_copy: bool,

    /// Minimum advance (in percent) between two progress updates
    pub progress_step_pct: f64,

    /// Maximum time between two progress updates while progress advances
    pub progress_interval_ms: u64,

    /// Capacity of the progress channel; updates beyond it are dropped
    pub progress_channel_capacity: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            verify_after_copy: false,
            progress_step_pct: 1.0,
            progress_interval_ms: 1000,
            progress_channel_capacity: 64,
        }
    }
}

impl MigrationConfig {
    /// Progress interval as a `Duration`
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.progress_step_pct > 0.0 && self.progress_step_pct <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "migration.progress_step_pct must be in (0, 100], got {}",
                self.progress_step_pct
            )));
        }

        if self.progress_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "migration.progress_channel_capacity cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,

    /// JSON format
    Json,
}
