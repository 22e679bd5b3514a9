//! Error types for the storage adapters and configuration.
//!
//! Uses `thiserror` so engine-level errors can wrap these as their `source`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error raised by a legacy or destination store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error reported by the LMDB environment
    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),

    /// Error reported by SQLite
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored log entry could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The requested key or log entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored record violates the store's layout
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true if this error means the item is absent rather than unreadable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store adapter operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::Config`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
