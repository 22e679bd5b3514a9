//! Migration orchestrator
//!
//! Drives one migration run as an explicit state machine:
//!
//! ```text
//! CheckPrecondition ─▶ Connecting ─▶ CopyingStable ─▶ CopyingLog ─┬─▶ Finalizing ─▶ Archiving ─▶ Done
//!        │                                                        └─▶ Verifying ─┘
//!        └─▶ Done (nothing to migrate)
//! ```
//!
//! Every state except `Done` can move to `Failed`, and that one transition
//! performs the cleanup: both destination artifacts are removed so a retry
//! starts from scratch. The legacy directory is only ever touched by the
//! final archive rename.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use raft_migrate_core::config::{Config, MigrationConfig};
use raft_migrate_core::storage::{DefaultBackend, DestinationStore, LegacyStore, StoreBackend};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::log::{copy_log_store, LogCopySummary};
use super::progress::{self, ProgressNotifier, ProgressUpdate};
use super::stable::copy_stable_store;
use super::{MigrationError, MigrationJob, Result, StoreKind, Target};

/// State of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Checking whether there is anything to migrate
    CheckPrecondition,
    /// Opening the legacy and destination stores
    Connecting,
    /// Copying the stable store
    CopyingStable,
    /// Copying the raft log
    CopyingLog,
    /// Comparing the destination against the legacy store
    Verifying,
    /// Closing the destination and moving it into place
    Finalizing,
    /// Renaming the legacy directory to its backup path
    Archiving,
    /// Finished, either migrated or nothing to do
    Done,
    /// Finished with an error; destination artifacts removed
    Failed,
}

impl MigrationState {
    /// States reachable from this one.
    pub fn allowed_transitions(self) -> &'static [MigrationState] {
        use MigrationState::*;
        match self {
            CheckPrecondition => &[Connecting, Done, Failed],
            Connecting => &[CopyingStable, Failed],
            CopyingStable => &[CopyingLog, Failed],
            CopyingLog => &[Verifying, Finalizing, Failed],
            Verifying => &[Finalizing, Failed],
            Finalizing => &[Archiving, Failed],
            Archiving => &[Done, Failed],
            Done | Failed => &[CheckPrecondition],
        }
    }

    /// Whether the run has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckPrecondition => write!(f, "check_precondition"),
            Self::Connecting => write!(f, "connecting"),
            Self::CopyingStable => write!(f, "copying_stable"),
            Self::CopyingLog => write!(f, "copying_log"),
            Self::Verifying => write!(f, "verifying"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Archiving => write!(f, "archiving"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Migrates one data directory from the legacy store to the destination
/// store.
pub struct Migrator<B: StoreBackend = DefaultBackend> {
    job: MigrationJob,
    backend: B,
    config: MigrationConfig,
    state: MigrationState,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl Migrator<DefaultBackend> {
    /// Migrator for `data_dir` with the default layout and settings.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(data_dir, &Config::default())
    }

    /// Migrator for `data_dir` with the given configuration.
    pub fn with_config(data_dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        Self::with_backend(data_dir, config, DefaultBackend)
    }
}

impl<B: StoreBackend> Migrator<B> {
    /// Migrator for `data_dir` using `backend` to open the stores.
    ///
    /// Fails if `data_dir` is not an existing directory. Nothing is opened
    /// or created until [`Migrator::migrate`] runs.
    pub fn with_backend(data_dir: impl Into<PathBuf>, config: &Config, backend: B) -> Result<Self> {
        let data_dir = data_dir.into();
        match fs::metadata(&data_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(MigrationError::InvalidDataDir {
                    path: data_dir,
                    reason: "not a directory".to_string(),
                })
            }
            Err(e) => {
                return Err(MigrationError::InvalidDataDir {
                    path: data_dir,
                    reason: e.to_string(),
                })
            }
        }

        Ok(Self {
            job: MigrationJob::new(data_dir, &config.layout),
            backend,
            config: config.migration.clone(),
            state: MigrationState::CheckPrecondition,
            progress_tx: None,
        })
    }

    /// Paths this migrator works with
    pub fn job(&self) -> &MigrationJob {
        &self.job
    }

    /// Current state
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Receive progress updates for subsequent runs.
    ///
    /// Updates that do not fit in the channel are dropped; the migration
    /// never waits for the receiver.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ProgressUpdate> {
        let (tx, rx) = progress::channel(self.config.progress_channel_capacity);
        self.progress_tx = Some(tx);
        rx
    }

    /// Run the migration.
    ///
    /// Returns `Ok(false)` when there is nothing to migrate (never migrated
    /// data, or already migrated), `Ok(true)` once the data was copied and
    /// the legacy directory archived. On error the destination artifacts
    /// have been removed and the legacy directory is untouched.
    pub fn migrate(&mut self) -> Result<bool> {
        self.state = MigrationState::CheckPrecondition;

        if !self.job.legacy_path().exists() {
            info!(
                path = %self.job.legacy_path().display(),
                "legacy store not found, nothing to migrate"
            );
            self.transition(MigrationState::Done);
            return Ok(false);
        }

        let start = Instant::now();
        let mut progress = self.notifier();

        match self.run(&mut progress) {
            Ok(summary) => {
                self.transition(MigrationState::Done);
                info!(
                    first = summary.first,
                    last = summary.last,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    dropped_updates = progress.dropped(),
                    "migration complete"
                );
                Ok(true)
            }
            Err(err) => {
                warn!(phase = %err.phase(), error = %err, "migration failed");
                self.transition(MigrationState::Failed);
                self.cleanup();
                Err(err)
            }
        }
    }

    fn run(&mut self, progress: &mut ProgressNotifier) -> Result<LogCopySummary> {
        self.transition(MigrationState::Connecting);
        let legacy = self
            .backend
            .open_legacy(self.job.legacy_path())
            .map_err(|source| MigrationError::Connect {
                store: StoreKind::Legacy,
                source,
            })?;

        let mut destination = match self.backend.open_destination(self.job.temp_path()) {
            Ok(destination) => destination,
            Err(source) => {
                release_legacy(legacy);
                return Err(MigrationError::Connect {
                    store: StoreKind::Destination,
                    source,
                });
            }
        };
        debug!(
            legacy = %self.job.legacy_path().display(),
            destination = %self.job.temp_path().display(),
            "stores connected"
        );

        let copied = self.copy(&legacy, &mut destination, progress);
        release_legacy(legacy);
        let summary = match copied {
            Ok(summary) => summary,
            Err(err) => {
                release_destination(destination);
                return Err(err);
            }
        };

        self.transition(MigrationState::Finalizing);
        destination
            .close()
            .map_err(|source| MigrationError::Finalize { source })?;
        fs::rename(self.job.temp_path(), self.job.destination_path()).map_err(|e| {
            MigrationError::Finalize {
                source: e.into(),
            }
        })?;

        self.transition(MigrationState::Archiving);
        fs::rename(self.job.legacy_path(), self.job.backup_path()).map_err(|source| {
            MigrationError::Archive {
                from: self.job.legacy_path().to_path_buf(),
                to: self.job.backup_path().to_path_buf(),
                source,
            }
        })?;
        info!(
            backup = %self.job.backup_path().display(),
            "legacy store archived"
        );

        Ok(summary)
    }

    fn copy(
        &mut self,
        legacy: &B::Legacy,
        destination: &mut B::Destination,
        progress: &mut ProgressNotifier,
    ) -> Result<LogCopySummary> {
        self.transition(MigrationState::CopyingStable);
        let keys = copy_stable_store(legacy, destination, progress)?;
        info!(keys, "stable store copied");

        self.transition(MigrationState::CopyingLog);
        let summary = copy_log_store(legacy, destination, progress)?;

        if self.config.verify_after_copy {
            self.transition(MigrationState::Verifying);
            verify(destination, &summary)?;
        }

        Ok(summary)
    }

    fn notifier(&self) -> ProgressNotifier {
        match &self.progress_tx {
            Some(tx) => ProgressNotifier::new(
                tx.clone(),
                self.config.progress_step_pct,
                self.config.progress_interval(),
            ),
            None => ProgressNotifier::disabled(),
        }
    }

    fn transition(&mut self, next: MigrationState) {
        debug_assert!(
            self.state.allowed_transitions().contains(&next),
            "illegal migration state transition: {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "migration state transition");
        self.state = next;
    }

    /// Remove every destination artifact. Failures are logged; the original
    /// error is what the caller needs to see.
    fn cleanup(&self) {
        for path in self.job.destination_artifacts() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed destination artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove destination artifact"
                ),
            }
        }
    }
}

fn verify<D: DestinationStore>(destination: &D, expected: &LogCopySummary) -> Result<()> {
    let read_bounds = |source| MigrationError::Read {
        store: StoreKind::Destination,
        target: Target::Bounds,
        source,
    };
    let first = destination.first_index().map_err(read_bounds)?;
    let last = destination.last_index().map_err(read_bounds)?;

    if first != expected.first || last != expected.last {
        return Err(MigrationError::VerificationFailed(format!(
            "destination holds [{first}, {last}], legacy holds [{}, {}]",
            expected.first, expected.last
        )));
    }
    debug!(first, last, "destination bounds verified");
    Ok(())
}

fn release_legacy<L: LegacyStore>(legacy: L) {
    if let Err(e) = legacy.close() {
        warn!(error = %e, "failed to close legacy store");
    }
}

fn release_destination<D: DestinationStore>(destination: D) {
    if let Err(e) = destination.close() {
        warn!(error = %e, "failed to close destination store");
    }
}
