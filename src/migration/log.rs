//! Log copy
//!
//! Copies the closed range `[first, last]` of log entries one at a time in
//! increasing index order. Destination engines may lay out storage assuming
//! monotonic appends, so entries are never reordered or batched.

use raft_migrate_core::storage::{DestinationStore, LegacyStore};
use raft_migrate_core::StoreError;
use tracing::{debug, info};

use super::progress::{ProgressNotifier, OP_LOG_STORE};
use super::{MigrationError, NoLogsReason, Result, StoreKind, Target};

/// Range of log indices copied by [`copy_log_store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCopySummary {
    /// First index copied
    pub first: u64,
    /// Last index copied
    pub last: u64,
}

impl LogCopySummary {
    /// Number of entries copied
    pub fn count(&self) -> u64 {
        self.last - self.first + 1
    }
}

/// Copy every log entry of `legacy` into `destination`.
pub fn copy_log_store<L, D>(
    legacy: &L,
    destination: &mut D,
    progress: &mut ProgressNotifier,
) -> Result<LogCopySummary>
where
    L: LegacyStore,
    D: DestinationStore,
{
    let bounds_error = |source| MigrationError::Read {
        store: StoreKind::Legacy,
        target: Target::Bounds,
        source,
    };

    let first = legacy.first_index().map_err(bounds_error)?;
    if first == 0 {
        return Err(MigrationError::NoLogsFound(NoLogsReason::FirstIndexZero));
    }
    let last = legacy.last_index().map_err(bounds_error)?;
    if last == 0 {
        return Err(MigrationError::NoLogsFound(NoLogsReason::LastIndexZero));
    }
    if last < first {
        return Err(bounds_error(StoreError::Corrupt(format!(
            "last index {last} precedes first index {first}"
        ))));
    }

    let summary = LogCopySummary { first, last };
    let total = summary.count();
    info!(first, last, total, "copying log store");
    progress.begin(OP_LOG_STORE);

    for index in first..=last {
        let entry = match legacy.get_log(index) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return Err(MigrationError::Read {
                    store: StoreKind::Legacy,
                    target: Target::Index(index),
                    source: StoreError::NotFound(format!("log entry {index}")),
                })
            }
            Err(source) => {
                return Err(MigrationError::Read {
                    store: StoreKind::Legacy,
                    target: Target::Index(index),
                    source,
                })
            }
        };

        destination
            .append_log(&entry)
            .map_err(|source| MigrationError::Write {
                store: StoreKind::Destination,
                target: Target::Index(index),
                source,
            })?;

        progress.advance(index - first + 1, total);
    }

    progress.finish();
    debug!(first, last, "log store copied");
    Ok(summary)
}
