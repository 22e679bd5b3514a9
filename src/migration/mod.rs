//! Raft store migration
//!
//! Copies the stable store and the raft log out of the legacy LMDB
//! environment into the SQLite store, then archives the legacy directory.
//!
//! # Phases
//!
//! 1. **Precondition check**: nothing to do when the legacy directory is gone.
//! 2. **Connect**: open the legacy store and a fresh destination temp file.
//! 3. **Stable copy**: copy the well-known stable-store keys.
//! 4. **Log copy**: copy every entry in `[first, last]`, in index order.
//! 5. **Finalize**: close the destination and move the temp file into place.
//! 6. **Archive**: rename the legacy directory to its backup path.
//!
//! Any failure removes the destination artifacts and leaves the legacy
//! directory where it was, so the migration can simply be run again.
//!
//! # Example
//!
//! ```ignore
//! use raft_migrate::migration::Migrator;
//!
//! let mut migrator = Migrator::new(data_dir)?;
//! let mut updates = migrator.subscribe();
//! tokio::spawn(async move {
//!     while let Some(update) = updates.recv().await {
//!         println!("{}: {:.2}%", update.op, update.progress);
//!     }
//! });
//! let migrated = migrator.migrate()?;
//! ```

pub mod log;
pub mod orchestrator;
pub mod progress;
pub mod stable;

#[cfg(test)]
pub(crate) mod testing;

pub use log::{copy_log_store, LogCopySummary};
pub use orchestrator::{MigrationState, Migrator};
pub use progress::{ProgressNotifier, ProgressUpdate, OP_LOG_STORE, OP_STABLE_STORE};
pub use stable::copy_stable_store;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use raft_migrate_core::config::LayoutConfig;
use raft_migrate_core::StoreError;

/// Which side of the migration an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The LMDB store being retired
    Legacy,
    /// The SQLite store being written
    Destination,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// What was being read or written when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A stable-store key
    Key(String),
    /// A log entry
    Index(u64),
    /// The first/last log index
    Bounds,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key {key:?}"),
            Self::Index(index) => write!(f, "log index {index}"),
            Self::Bounds => write!(f, "log index bounds"),
        }
    }
}

/// Why the log copy found nothing to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoLogsReason {
    /// The legacy store reported a first index of 0
    FirstIndexZero,
    /// The legacy store reported a last index of 0
    LastIndexZero,
}

impl fmt::Display for NoLogsReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstIndexZero => write!(f, "first index was 0"),
            Self::LastIndexZero => write!(f, "last index was 0"),
        }
    }
}

/// Migration error
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The data directory is missing or not a directory
    #[error("invalid data directory {}: {reason}", path.display())]
    InvalidDataDir {
        /// Path given by the caller
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A store could not be opened
    #[error("failed to open {store} store: {source}")]
    Connect {
        /// Store that failed to open
        store: StoreKind,
        /// Adapter error
        source: StoreError,
    },

    /// The legacy store holds no log entries
    #[error("no logs found ({0})")]
    NoLogsFound(NoLogsReason),

    /// Reading from a store failed
    #[error("failed to read {target} from {store} store: {source}")]
    Read {
        /// Store read from
        store: StoreKind,
        /// Item being read
        target: Target,
        /// Adapter error
        source: StoreError,
    },

    /// Writing to a store failed
    #[error("failed to write {target} to {store} store: {source}")]
    Write {
        /// Store written to
        store: StoreKind,
        /// Item being written
        target: Target,
        /// Adapter error
        source: StoreError,
    },

    /// The destination does not hold what the legacy store holds
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// The destination could not be closed or moved into place
    #[error("failed to finalize destination store: {source}")]
    Finalize {
        /// Adapter or rename error
        source: StoreError,
    },

    /// The legacy directory could not be renamed to its backup path
    #[error("failed to archive {} to {}: {source}", from.display(), to.display())]
    Archive {
        /// Legacy directory
        from: PathBuf,
        /// Backup path
        to: PathBuf,
        /// Rename error
        source: io::Error,
    },
}

impl MigrationError {
    /// Phase the migration was in when this error was raised.
    pub fn phase(&self) -> MigrationState {
        match self {
            Self::InvalidDataDir { .. } => MigrationState::CheckPrecondition,
            Self::Connect { .. } => MigrationState::Connecting,
            Self::NoLogsFound(_) => MigrationState::CopyingLog,
            Self::Read {
                store: StoreKind::Destination,
                ..
            }
            | Self::VerificationFailed(_) => MigrationState::Verifying,
            Self::Read { target, .. } | Self::Write { target, .. } => match target {
                Target::Key(_) => MigrationState::CopyingStable,
                Target::Index(_) | Target::Bounds => MigrationState::CopyingLog,
            },
            Self::Finalize { .. } => MigrationState::Finalizing,
            Self::Archive { .. } => MigrationState::Archiving,
        }
    }

    /// Whether running the migration again may succeed.
    ///
    /// Every failure after construction leaves the legacy data in place and
    /// the destination swept, so only a bad data directory is permanent.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidDataDir { .. })
    }
}

/// Migration result type
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Paths one migration run works with, derived once from the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationJob {
    data_dir: PathBuf,
    raft_path: PathBuf,
    legacy_path: PathBuf,
    backup_path: PathBuf,
    destination_path: PathBuf,
    temp_path: PathBuf,
}

impl MigrationJob {
    /// Derive every path from `data_dir` and the configured layout.
    pub fn new(data_dir: impl Into<PathBuf>, layout: &LayoutConfig) -> Self {
        let data_dir = data_dir.into();
        let raft_path = data_dir.join(&layout.raft_dir);
        let temp_name = format!("{}{}", layout.destination_file, layout.temp_suffix);

        Self {
            legacy_path: raft_path.join(&layout.legacy_dir),
            backup_path: raft_path.join(&layout.backup_dir),
            destination_path: raft_path.join(&layout.destination_file),
            temp_path: raft_path.join(temp_name),
            raft_path,
            data_dir,
        }
    }

    /// Data directory given by the caller
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Raft sub-directory
    pub fn raft_path(&self) -> &Path {
        &self.raft_path
    }

    /// Legacy LMDB environment directory
    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// Where the legacy directory is moved after success
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Final destination database file
    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    /// Destination database file while the copy is in progress
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Files a failed run must not leave behind
    pub(crate) fn destination_artifacts(&self) -> [&Path; 2] {
        [&self.temp_path, &self.destination_path]
    }
}
