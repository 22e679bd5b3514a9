//! Shared test utilities for raft-migrate integration tests.
//!
//! Import via `mod common;` in integration test files:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;

use raft_migrate::storage::{
    DestinationStore, LegacyStore, LmdbStore, LogEntry, LogKind, SqliteStore, STABLE_STORE_KEYS,
};

// ============================================================================
// Layout helpers
// ============================================================================

/// `<data>/raft/mdb`
#[allow(dead_code)]
pub fn legacy_path(data_dir: &Path) -> PathBuf {
    data_dir.join("raft").join("mdb")
}

/// `<data>/raft/mdb.backup`
#[allow(dead_code)]
pub fn backup_path(data_dir: &Path) -> PathBuf {
    data_dir.join("raft").join("mdb.backup")
}

/// `<data>/raft/raft.db`
#[allow(dead_code)]
pub fn destination_path(data_dir: &Path) -> PathBuf {
    data_dir.join("raft").join("raft.db")
}

/// `<data>/raft/raft.db.tmp`
#[allow(dead_code)]
pub fn temp_path(data_dir: &Path) -> PathBuf {
    data_dir.join("raft").join("raft.db.tmp")
}

// ============================================================================
// Fixture helpers
// ============================================================================

/// Log entries covering `range`, cycling through every kind.
#[allow(dead_code)]
pub fn sample_entries(range: std::ops::RangeInclusive<u64>) -> Vec<LogEntry> {
    range
        .map(|i| {
            let kind = LogKind::ALL[(i % LogKind::ALL.len() as u64) as usize];
            LogEntry::new(i, i / 5 + 1, kind, format!("entry-{i}").into_bytes())
        })
        .collect()
}

/// Stable-store values used by [`standard_fixture`].
#[allow(dead_code)]
pub fn sample_stable() -> Vec<(&'static str, Bytes)> {
    vec![
        ("CurrentTerm", Bytes::copy_from_slice(&3u64.to_be_bytes())),
        ("LastVoteTerm", Bytes::copy_from_slice(&2u64.to_be_bytes())),
        ("LastVoteCand", Bytes::from_static(b"10.0.0.2:8300")),
    ]
}

/// Write a legacy LMDB store under `data_dir`.
#[allow(dead_code)]
pub fn seed_legacy(data_dir: &Path, stable: &[(&str, Bytes)], entries: &[LogEntry]) {
    let store = LmdbStore::create(legacy_path(data_dir)).expect("should create legacy store");
    for (key, value) in stable {
        store
            .set(key.as_bytes(), value)
            .expect("should write stable key");
    }
    if !entries.is_empty() {
        store.store_logs(entries).expect("should write log entries");
    }
    store.close().expect("should close legacy store");
}

/// Data directory holding all three stable keys and entries 1..=10.
#[allow(dead_code)]
pub fn standard_fixture() -> TempDir {
    let dir = tempfile::tempdir().expect("should create temp dir");
    seed_legacy(dir.path(), &sample_stable(), &sample_entries(1..=10));
    dir
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert the migrated destination holds exactly `stable` and `entries`.
#[allow(dead_code)]
pub fn assert_destination_matches(data_dir: &Path, stable: &[(&str, Bytes)], entries: &[LogEntry]) {
    let store = SqliteStore::open(destination_path(data_dir)).expect("should open destination");

    for key in STABLE_STORE_KEYS {
        let expected = stable.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
        assert_eq!(
            store.get(key.as_bytes()).expect("should read stable key"),
            expected,
            "stable key {key}"
        );
    }

    let first = entries.first().map_or(0, |e| e.index);
    let last = entries.last().map_or(0, |e| e.index);
    assert_eq!(store.first_index().expect("should read first index"), first);
    assert_eq!(store.last_index().expect("should read last index"), last);
    for entry in entries {
        assert_eq!(
            store.get_log(entry.index).expect("should read log entry").as_ref(),
            Some(entry),
            "log entry {}",
            entry.index
        );
    }
    store.close().expect("should close destination");
}

/// File names and sizes under `dir`, sorted, recursing into subdirectories.
#[allow(dead_code)]
pub fn snapshot_dir(dir: &Path) -> Vec<(PathBuf, u64)> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, u64)>) {
        for entry in fs::read_dir(dir).expect("should read dir") {
            let entry = entry.expect("should read dir entry");
            let path = entry.path();
            let meta = entry.metadata().expect("should read metadata");
            if meta.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).expect("under root").to_path_buf();
                out.push((rel, meta.len()));
            }
        }
    }

    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

/// Assert a failed run left the legacy store exactly as `before` and
/// nothing else behind.
#[allow(dead_code)]
pub fn assert_untouched(data_dir: &Path, before: &[(PathBuf, u64)]) {
    let legacy = legacy_path(data_dir);
    assert!(legacy.is_dir(), "legacy store should remain");
    assert_eq!(snapshot_dir(&legacy), before, "legacy store contents changed");
    assert!(!backup_path(data_dir).exists(), "legacy store should not be archived");
    assert!(!destination_path(data_dir).exists(), "destination should be removed");
    assert!(!temp_path(data_dir).exists(), "temp file should be removed");
}

/// Open the legacy store and read its bounds.
#[allow(dead_code)]
pub fn legacy_bounds(path: &Path) -> (u64, u64) {
    let store = LmdbStore::open(path).expect("should open legacy store");
    let bounds = (
        store.first_index().expect("should read first index"),
        store.last_index().expect("should read last index"),
    );
    store.close().expect("should close legacy store");
    bounds
}
