//! In-memory stores with failure injection for migration unit tests.

use std::collections::BTreeMap;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use raft_migrate_core::storage::{DestinationStore, LegacyStore, LogEntry, LogKind, StoreBackend};
use raft_migrate_core::StoreError;

type StoreResult<T> = raft_migrate_core::Result<T>;

/// Entries with distinct terms, kinds and payloads for every index in `range`.
pub(crate) fn entries(range: RangeInclusive<u64>) -> Vec<LogEntry> {
    range
        .map(|i| {
            let kind = LogKind::ALL[(i % LogKind::ALL.len() as u64) as usize];
            LogEntry::new(i, i / 4 + 1, kind, format!("payload-{i}"))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryLegacy {
    pub stable: BTreeMap<Vec<u8>, Bytes>,
    pub logs: BTreeMap<u64, LogEntry>,
    pub last_override: Option<u64>,
    /// Reading this stable key fails with a corrupt-record error
    pub fail_key: Option<&'static str>,
    pub closed: Arc<AtomicBool>,
}

impl LegacyStore for MemoryLegacy {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        if self.fail_key.map(str::as_bytes) == Some(key) {
            return Err(StoreError::Corrupt("injected read failure".to_string()));
        }
        Ok(self.stable.get(key).cloned())
    }

    fn first_index(&self) -> StoreResult<u64> {
        Ok(self.logs.keys().next().copied().unwrap_or(0))
    }

    fn last_index(&self) -> StoreResult<u64> {
        Ok(self
            .last_override
            .unwrap_or_else(|| self.logs.keys().next_back().copied().unwrap_or(0)))
    }

    fn get_log(&self, index: u64) -> StoreResult<Option<LogEntry>> {
        Ok(self.logs.get(&index).cloned())
    }

    fn close(self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// What a [`MemoryDestination`] received.
#[derive(Debug, Default)]
pub(crate) struct Written {
    pub stable: BTreeMap<Vec<u8>, Bytes>,
    pub logs: Vec<LogEntry>,
    pub closed: bool,
}

#[derive(Debug)]
pub(crate) struct MemoryDestination {
    written: Arc<Mutex<Written>>,
    fail_append_at: Option<u64>,
    skew_last: bool,
}

impl MemoryDestination {
    pub fn new(written: Arc<Mutex<Written>>) -> Self {
        Self {
            written,
            fail_append_at: None,
            skew_last: false,
        }
    }
}

impl DestinationStore for MemoryDestination {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.written
            .lock()
            .stable
            .insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn append_log(&mut self, entry: &LogEntry) -> StoreResult<()> {
        if self.fail_append_at == Some(entry.index) {
            return Err(StoreError::Corrupt("injected write failure".to_string()));
        }
        let mut written = self.written.lock();
        if let Some(prev) = written.logs.last() {
            assert!(prev.index < entry.index, "appends out of order");
        }
        written.logs.push(entry.clone());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        Ok(self.written.lock().stable.get(key).cloned())
    }

    fn get_log(&self, index: u64) -> StoreResult<Option<LogEntry>> {
        Ok(self
            .written
            .lock()
            .logs
            .iter()
            .find(|e| e.index == index)
            .cloned())
    }

    fn first_index(&self) -> StoreResult<u64> {
        Ok(self.written.lock().logs.first().map_or(0, |e| e.index))
    }

    fn last_index(&self) -> StoreResult<u64> {
        let last = self.written.lock().logs.last().map_or(0, |e| e.index);
        Ok(if self.skew_last { last + 1 } else { last })
    }

    fn close(self) -> StoreResult<()> {
        self.written.lock().closed = true;
        Ok(())
    }
}

/// Backend handing out a [`MemoryLegacy`] clone and a [`MemoryDestination`].
///
/// Opening the destination creates an empty marker file at its path so that
/// finalize and cleanup have a real file to move or remove.
#[derive(Debug, Default)]
pub(crate) struct MemoryBackend {
    pub legacy: MemoryLegacy,
    pub destination: Arc<Mutex<Written>>,
    pub opened: Arc<AtomicUsize>,
    pub fail_open_legacy: bool,
    pub fail_open_destination: bool,
    pub fail_append_at: Option<u64>,
    pub skew_destination_last: bool,
}

impl MemoryBackend {
    pub fn with_logs(logs: Vec<LogEntry>) -> Self {
        let mut backend = Self::default();
        backend.legacy.logs = logs.into_iter().map(|e| (e.index, e)).collect();
        backend
    }

    pub fn with_stable(mut self, key: &str, value: impl AsRef<[u8]>) -> Self {
        self.legacy
            .stable
            .insert(key.as_bytes().to_vec(), Bytes::copy_from_slice(value.as_ref()));
        self
    }
}

impl StoreBackend for MemoryBackend {
    type Legacy = MemoryLegacy;
    type Destination = MemoryDestination;

    fn open_legacy(&self, _path: &Path) -> StoreResult<MemoryLegacy> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open_legacy {
            return Err(StoreError::Corrupt("injected open failure".to_string()));
        }
        Ok(self.legacy.clone())
    }

    fn open_destination(&self, path: &Path) -> StoreResult<MemoryDestination> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open_destination {
            return Err(StoreError::Corrupt("injected open failure".to_string()));
        }
        fs::write(path, b"")?;
        *self.destination.lock() = Written::default();
        Ok(MemoryDestination {
            fail_append_at: self.fail_append_at,
            skew_last: self.skew_destination_last,
            ..MemoryDestination::new(self.destination.clone())
        })
    }
}
