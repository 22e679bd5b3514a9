//! LMDB-backed raft store (legacy engine)
//!
//! The environment holds two named sub-databases:
//!
//! - `conf`: stable-store keys to raw values
//! - `logs`: big-endian `u64` index to a bincode-encoded [`LogEntry`]
//!
//! The migration only reads from it, and a directory without a `data.mdb`
//! is read as an empty store without opening an environment, so nothing is
//! ever created inside the legacy directory. Writers ([`LmdbStore::create`],
//! [`LmdbStore::set`], [`LmdbStore::store_logs`]) exist so that a legacy
//! data directory can be built for tests and fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use heed::byteorder::BigEndian;
use heed::types::{Bytes as RawBytes, U64};
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use super::{LegacyStore, LogEntry};
use crate::error::{Result, StoreError};

/// Sub-database holding the stable store
pub const CONF_DB: &str = "conf";

/// Sub-database holding the log
pub const LOGS_DB: &str = "logs";

/// LMDB data file inside the environment directory
pub const DATA_FILE: &str = "data.mdb";

const MAX_DBS: u32 = 2;

/// Memory map size requested for the environment. 64-bit targets get a
/// much larger address-space reservation.
#[cfg(target_pointer_width = "64")]
pub const MAP_SIZE: usize = 64 * 1024 * 1024 * 1024;

/// Memory map size requested for the environment. 64-bit targets get a
/// much larger address-space reservation.
#[cfg(not(target_pointer_width = "64"))]
pub const MAP_SIZE: usize = 1024 * 1024 * 1024;

type ConfDb = Database<RawBytes, RawBytes>;
type LogsDb = Database<U64<BigEndian>, RawBytes>;

/// Handle on an LMDB raft environment.
pub struct LmdbStore {
    /// `None` when the directory holds no environment
    env: Option<Env>,
    path: PathBuf,
    /// `None` when the sub-database was never created
    conf: Option<ConfDb>,
    /// `None` when the sub-database was never created
    logs: Option<LogsDb>,
}

impl LmdbStore {
    /// Open an existing environment for reading.
    ///
    /// Sub-databases that were never created read as empty, and so does a
    /// directory without a data file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.join(DATA_FILE).is_file() {
            debug!(path = %path.display(), "no LMDB data file, reading as empty");
            return Ok(Self {
                env: None,
                path: path.to_path_buf(),
                conf: None,
                logs: None,
            });
        }
        let env = open_env(path)?;

        let rtxn = env.read_txn()?;
        let conf: Option<ConfDb> = env.open_database(&rtxn, Some(CONF_DB))?;
        let logs: Option<LogsDb> = env.open_database(&rtxn, Some(LOGS_DB))?;
        rtxn.commit()?;

        debug!(
            path = %path.display(),
            has_conf = conf.is_some(),
            has_logs = logs.is_some(),
            "opened LMDB store"
        );

        Ok(Self {
            env: Some(env),
            path: path.to_path_buf(),
            conf,
            logs,
        })
    }

    /// Open an environment for writing, creating the directory and both
    /// sub-databases if needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let env = open_env(path)?;

        let mut wtxn = env.write_txn()?;
        let conf: ConfDb = env.create_database(&mut wtxn, Some(CONF_DB))?;
        let logs: LogsDb = env.create_database(&mut wtxn, Some(LOGS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env: Some(env),
            path: path.to_path_buf(),
            conf: Some(conf),
            logs: Some(logs),
        })
    }

    /// Environment directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a stable-store value.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let (Some(env), Some(conf)) = (self.env.as_ref(), self.conf.as_ref()) else {
            return Err(missing_db(CONF_DB));
        };
        let mut wtxn = env.write_txn()?;
        conf.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Store log entries in a single transaction, keyed by their index.
    pub fn store_logs(&self, entries: &[LogEntry]) -> Result<()> {
        let (Some(env), Some(logs)) = (self.env.as_ref(), self.logs.as_ref()) else {
            return Err(missing_db(LOGS_DB));
        };
        let mut wtxn = env.write_txn()?;
        for entry in entries {
            let encoded = bincode::serialize(entry)?;
            logs.put(&mut wtxn, &entry.index, encoded.as_slice())?;
        }
        wtxn.commit()?;
        Ok(())
    }

    fn bound(&self, last: bool) -> Result<u64> {
        let (Some(env), Some(logs)) = (self.env.as_ref(), self.logs.as_ref()) else {
            return Ok(0);
        };
        let rtxn = env.read_txn()?;
        let found = if last {
            logs.last(&rtxn)?
        } else {
            logs.first(&rtxn)?
        };
        Ok(found.map(|(index, _)| index).unwrap_or(0))
    }
}

impl LegacyStore for LmdbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let (Some(env), Some(conf)) = (self.env.as_ref(), self.conf.as_ref()) else {
            return Ok(None);
        };
        let rtxn = env.read_txn()?;
        let value = conf.get(&rtxn, key)?.map(Bytes::copy_from_slice);
        Ok(value)
    }

    fn first_index(&self) -> Result<u64> {
        self.bound(false)
    }

    fn last_index(&self) -> Result<u64> {
        self.bound(true)
    }

    fn get_log(&self, index: u64) -> Result<Option<LogEntry>> {
        let (Some(env), Some(logs)) = (self.env.as_ref(), self.logs.as_ref()) else {
            return Ok(None);
        };
        let rtxn = env.read_txn()?;
        let Some(raw) = logs.get(&rtxn, &index)? else {
            return Ok(None);
        };

        let entry: LogEntry = bincode::deserialize(raw)?;
        if entry.index != index {
            return Err(StoreError::Corrupt(format!(
                "log key {index} holds entry with index {}",
                entry.index
            )));
        }
        Ok(Some(entry))
    }

    fn close(self) -> Result<()> {
        let Self { env, path, .. } = self;
        if let Some(env) = env {
            env.prepare_for_closing().wait();
        }
        debug!(path = %path.display(), "closed LMDB store");
        Ok(())
    }
}

fn open_env(path: &Path) -> Result<Env> {
    // SAFETY: the process owns the data directory exclusively while it runs,
    // so nothing else maps or truncates these files underneath us.
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(MAP_SIZE)
            .max_dbs(MAX_DBS)
            .open(path)?
    };
    Ok(env)
}

fn missing_db(name: &str) -> StoreError {
    StoreError::NotFound(format!("LMDB sub-database {name:?}"))
}
