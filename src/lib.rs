//! # raft-migrate
//!
//! Moves the persisted state of a raft server (the stable store and the
//! raft log) from the legacy LMDB environment to a single-file SQLite store.
//!
//! The migration is safe to run at any time: before the first attempt, as a
//! retry after a failed attempt, or after it already succeeded (in which case
//! it does nothing).
//!
//! ```ignore
//! use raft_migrate::Migrator;
//!
//! let mut migrator = Migrator::new("/var/lib/app")?;
//! let migrated = migrator.migrate()?;
//! ```

// ── Re-exports from raft-migrate-core ─────────────────────────────────────────

pub use raft_migrate_core::config;
pub use raft_migrate_core::error;
pub use raft_migrate_core::storage;

pub use raft_migrate_core::Config;

// ── Top-level modules ─────────────────────────────────────────────────────────

pub mod migration;

pub use migration::{MigrationError, MigrationJob, MigrationState, Migrator, ProgressUpdate};
