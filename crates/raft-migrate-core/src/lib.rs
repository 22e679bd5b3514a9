//! # raft-migrate-core
//!
//! Storage adapters, configuration and error types shared by the
//! `raft-migrate` engine and its command-line tool.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`storage`] | Capability traits plus the LMDB (legacy) and SQLite (destination) adapters |
//! | [`config`] | TOML configuration with defaults for every value |
//! | [`error`] | Adapter and configuration error types |

pub mod config;
pub mod error;
pub mod storage;

pub use config::Config;
pub use error::{ConfigError, Result, StoreError};
