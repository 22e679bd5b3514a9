//! Stable-store copy
//!
//! The stable store holds a closed set of well-known keys (current term and
//! the last vote). Each is copied as-is; keys the legacy store does not have
//! are skipped.

use raft_migrate_core::storage::{DestinationStore, LegacyStore, STABLE_STORE_KEYS};
use tracing::debug;

use super::progress::{ProgressNotifier, OP_STABLE_STORE};
use super::{MigrationError, Result, StoreKind, Target};

/// Copy every stable-store key present in `legacy` into `destination`.
///
/// Returns the number of keys copied.
pub fn copy_stable_store<L, D>(
    legacy: &L,
    destination: &mut D,
    progress: &mut ProgressNotifier,
) -> Result<usize>
where
    L: LegacyStore,
    D: DestinationStore,
{
    progress.begin(OP_STABLE_STORE);
    let total = STABLE_STORE_KEYS.len() as u64;
    let mut copied = 0;

    for (done, key) in (1u64..).zip(STABLE_STORE_KEYS) {
        let value = match legacy.get(key.as_bytes()) {
            Ok(Some(value)) => Some(value),
            Ok(None) => None,
            Err(e) if e.is_not_found() => None,
            Err(source) => {
                return Err(MigrationError::Read {
                    store: StoreKind::Legacy,
                    target: Target::Key(key.to_string()),
                    source,
                })
            }
        };

        match value {
            Some(value) => {
                destination
                    .set(key.as_bytes(), &value)
                    .map_err(|source| MigrationError::Write {
                        store: StoreKind::Destination,
                        target: Target::Key(key.to_string()),
                        source,
                    })?;
                debug!(key, len = value.len(), "copied stable key");
                copied += 1;
            }
            None => debug!(key, "stable key not in legacy store, skipping"),
        }

        progress.advance(done, total);
    }

    progress.finish();
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::testing::{MemoryDestination, MemoryLegacy, Written};
    use std::sync::Arc;

    #[test]
    fn test_copies_present_keys_only() {
        let mut legacy = MemoryLegacy::default();
        legacy
            .stable
            .insert(b"CurrentTerm".to_vec(), bytes::Bytes::from_static(b"\x00\x07"));
        legacy
            .stable
            .insert(b"LastVoteCand".to_vec(), bytes::Bytes::from_static(b"node-1"));
        // Not part of the stable store, never copied.
        legacy
            .stable
            .insert(b"SnapshotMeta".to_vec(), bytes::Bytes::from_static(b"x"));

        let written = Arc::new(parking_lot::Mutex::new(Written::default()));
        let mut destination = MemoryDestination::new(written.clone());
        let copied = copy_stable_store(&legacy, &mut destination, &mut ProgressNotifier::disabled())
            .expect("copy");

        assert_eq!(copied, 2);
        let written = written.lock();
        assert_eq!(written.stable.len(), 2);
        assert_eq!(
            written.stable.get(b"CurrentTerm".as_slice()).map(|v| v.as_ref()),
            Some(b"\x00\x07".as_slice())
        );
        assert!(!written.stable.contains_key(b"LastVoteTerm".as_slice()));
    }

    #[test]
    fn test_empty_legacy_copies_nothing() {
        let written = Arc::new(parking_lot::Mutex::new(Written::default()));
        let mut destination = MemoryDestination::new(written.clone());
        let copied = copy_stable_store(
            &MemoryLegacy::default(),
            &mut destination,
            &mut ProgressNotifier::disabled(),
        )
        .expect("copy");

        assert_eq!(copied, 0);
        assert!(written.lock().stable.is_empty());
    }

    #[test]
    fn test_read_failure_names_key() {
        let legacy = MemoryLegacy {
            fail_key: Some("CurrentTerm"),
            ..MemoryLegacy::default()
        };
        let written = Arc::new(parking_lot::Mutex::new(Written::default()));
        let mut destination = MemoryDestination::new(written);

        let err = copy_stable_store(&legacy, &mut destination, &mut ProgressNotifier::disabled())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to read key \"CurrentTerm\" from legacy store: corrupt record: injected read failure"
        );
    }
}
