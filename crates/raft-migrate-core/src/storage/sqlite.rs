//! SQLite-backed raft store (destination engine)
//!
//! Everything lives in one database file with two tables:
//!
//! - `stable(key, value)`: the stable store
//! - `logs(idx, term, kind, data)`: the log, keyed by the 8-byte big-endian
//!   index so that the full `u64` range is kept and BLOB ordering matches
//!   numeric ordering. `term` holds the `u64` bit pattern in SQLite's signed
//!   64-bit integer, so terms above `i64::MAX` read back as negative numbers
//!   in SQL but round-trip exactly.
//!
//! A store opened with [`SqliteStore::create`] writes inside one transaction
//! that is committed by [`DestinationStore::close`], after which the file is
//! fsynced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use super::{DestinationStore, LogEntry, LogKind};
use crate::error::{Result, StoreError};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS stable (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS logs (
    idx  BLOB PRIMARY KEY,
    term INTEGER NOT NULL,
    kind INTEGER NOT NULL,
    data BLOB NOT NULL
);
";

/// Handle on a SQLite raft database.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    in_txn: bool,
}

impl SqliteStore {
    /// Create a fresh database at `path`.
    ///
    /// A file left at `path` by an aborted earlier write is removed first, so
    /// the store always starts empty.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        remove_stale(path)?;
        remove_stale(&journal_path(path))?;

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute_batch("BEGIN IMMEDIATE")?;

        debug!(path = %path.display(), "created SQLite store");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            in_txn: true,
        })
    }

    /// Open an existing database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            in_txn: false,
        })
    }

    /// Database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bound(&self, order: &str) -> Result<u64> {
        let sql = format!("SELECT idx FROM logs ORDER BY idx {order} LIMIT 1");
        let raw = self
            .conn
            .query_row(&sql, [], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        raw.map(|raw| decode_index(&raw)).transpose().map(|i| i.unwrap_or(0))
    }
}

impl DestinationStore for SqliteStore {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn
            .prepare_cached("INSERT OR REPLACE INTO stable (key, value) VALUES (?1, ?2)")?
            .execute(params![key, value])?;
        Ok(())
    }

    fn append_log(&mut self, entry: &LogEntry) -> Result<()> {
        self.conn
            .prepare_cached("INSERT INTO logs (idx, term, kind, data) VALUES (?1, ?2, ?3, ?4)")?
            .execute(params![
                &entry.index.to_be_bytes()[..],
                entry.term as i64,
                i64::from(entry.kind.as_u8()),
                entry.data.as_ref(),
            ])?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let value = self
            .conn
            .query_row("SELECT value FROM stable WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value.map(Bytes::from))
    }

    fn get_log(&self, index: u64) -> Result<Option<LogEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT term, kind, data FROM logs WHERE idx = ?1",
                params![&index.to_be_bytes()[..]],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((term, kind, data)) = row else {
            return Ok(None);
        };

        let kind = u8::try_from(kind)
            .ok()
            .and_then(LogKind::from_u8)
            .ok_or_else(|| StoreError::Corrupt(format!("log {index} has unknown kind {kind}")))?;

        Ok(Some(LogEntry {
            index,
            term: term as u64,
            kind,
            data: Bytes::from(data),
        }))
    }

    fn first_index(&self) -> Result<u64> {
        self.bound("ASC")
    }

    fn last_index(&self) -> Result<u64> {
        self.bound("DESC")
    }

    fn close(self) -> Result<()> {
        let Self { conn, path, in_txn } = self;
        if in_txn {
            conn.execute_batch("COMMIT")?;
        }
        conn.close().map_err(|(_, e)| e)?;
        fs::File::open(&path)?.sync_all()?;

        debug!(path = %path.display(), "closed SQLite store");
        Ok(())
    }
}

fn decode_index(raw: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("log index has {} bytes, expected 8", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-journal");
    PathBuf::from(name)
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(e)),
    }
}
