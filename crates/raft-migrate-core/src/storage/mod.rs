//! Raft log storage
//!
//! The migration engine reaches both storage engines only through the narrow
//! capability traits defined here:
//!
//! - [`LegacyStore`]: read-only view of the store being retired
//! - [`DestinationStore`]: write view of the store taking over
//!
//! [`StoreBackend`] pairs one implementation of each so that the engine can
//! open them at paths it computes itself. [`DefaultBackend`] pairs the LMDB
//! environment with the single-file SQLite store.

pub mod lmdb;
pub mod sqlite;

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use lmdb::LmdbStore;
pub use sqlite::SqliteStore;

/// Stable-store keys the consensus layer persists, in copy order.
///
/// The set is closed: nothing else lives in the stable store.
pub const STABLE_STORE_KEYS: [&str; 3] = ["CurrentTerm", "LastVoteTerm", "LastVoteCand"];

/// Kind of a raft log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogKind {
    /// Command applied to the user state machine
    Command = 0,
    /// No-op appended by a new leader
    Noop = 1,
    /// Legacy membership change adding a peer
    AddPeer = 2,
    /// Legacy membership change removing a peer
    RemovePeer = 3,
    /// Barrier used to wait for preceding entries to apply
    Barrier = 4,
    /// Cluster configuration change
    Configuration = 5,
}

impl LogKind {
    /// All kinds, in discriminant order.
    pub const ALL: [LogKind; 6] = [
        LogKind::Command,
        LogKind::Noop,
        LogKind::AddPeer,
        LogKind::RemovePeer,
        LogKind::Barrier,
        LogKind::Configuration,
    ];

    /// Numeric tag used by stores that keep the kind in a column
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`LogKind::as_u8`]
    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }
}

/// A single entry in the raft log.
///
/// Only `index` is interpreted by the migration; the rest is copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log (1-based; 0 means "absent")
    pub index: u64,
    /// Term in which the entry was created
    pub term: u64,
    /// What the entry carries
    pub kind: LogKind,
    /// Opaque payload
    pub data: Bytes,
}

impl LogEntry {
    /// Create a new entry
    pub fn new(index: u64, term: u64, kind: LogKind, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            term,
            kind,
            data: data.into(),
        }
    }
}

/// Read-only capability over the store being migrated away from.
pub trait LegacyStore {
    /// Value stored under a stable-store key, `None` if absent
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Lowest log index present, 0 if the log is empty
    fn first_index(&self) -> Result<u64>;

    /// Highest log index present, 0 if the log is empty
    fn last_index(&self) -> Result<u64>;

    /// Log entry at `index`, `None` if absent
    fn get_log(&self, index: u64) -> Result<Option<LogEntry>>;

    /// Release the store
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Write capability over the store being migrated to.
pub trait DestinationStore {
    /// Store `value` under a stable-store key
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Append one log entry. Callers append in increasing index order.
    fn append_log(&mut self, entry: &LogEntry) -> Result<()>;

    /// Read back a stable-store value, `None` if absent
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Read back the log entry at `index`, `None` if absent
    fn get_log(&self, index: u64) -> Result<Option<LogEntry>>;

    /// Lowest log index held, 0 if none
    fn first_index(&self) -> Result<u64>;

    /// Highest log index held, 0 if none
    fn last_index(&self) -> Result<u64>;

    /// Flush everything written and release the store
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens the pair of stores a migration runs between.
pub trait StoreBackend {
    /// Store read from
    type Legacy: LegacyStore;
    /// Store written to
    type Destination: DestinationStore;

    /// Open the legacy store located at `path`
    fn open_legacy(&self, path: &Path) -> Result<Self::Legacy>;

    /// Create a fresh destination store at `path`, replacing whatever an
    /// aborted earlier attempt left there
    fn open_destination(&self, path: &Path) -> Result<Self::Destination>;
}

/// LMDB to SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

impl StoreBackend for DefaultBackend {
    type Legacy = LmdbStore;
    type Destination = SqliteStore;

    fn open_legacy(&self, path: &Path) -> Result<LmdbStore> {
        LmdbStore::open(path)
    }

    fn open_destination(&self, path: &Path) -> Result<SqliteStore> {
        SqliteStore::create(path)
    }
}
