//! raft-migrate - moves a node's raft data from the legacy LMDB store to the
//! SQLite store.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use raft_migrate::config::LogFormat;
use raft_migrate::{Config, Migrator};
use tracing::debug;

/// Environment variable naming an optional TOML configuration file
const CONFIG_ENV: &str = "RAFT_MIGRATE_CONFIG";

/// raft-migrate - migrate raft data to the SQLite store
#[derive(Parser, Debug)]
#[command(name = "raft-migrate", disable_version_flag = true)]
struct Cli {
    /// Node data directory containing `raft/mdb`
    #[arg(value_name = "data-dir")]
    data_dir: PathBuf,
}

fn usage() -> String {
    format!(
        "Usage: raft-migrate <data-dir>

Migrates the raft data in <data-dir> from the legacy LMDB store
(raft/mdb) to the SQLite store (raft/raft.db), then renames the
legacy store to raft/mdb.backup.

Environment:
  {CONFIG_ENV}  path to a TOML configuration file
  RUST_LOG             log filter, overrides the configured level"
    )
}

/// Load the configuration named by `RAFT_MIGRATE_CONFIG`, or the defaults.
fn load_config() -> anyhow::Result<Config> {
    let Some(path) = std::env::var_os(CONFIG_ENV) else {
        return Ok(Config::default());
    };
    let path = PathBuf::from(path);

    let config = Config::from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Initialize logging based on configuration
fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // try_init: a second call (tests) keeps the first subscriber.
    let _ = match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
}

async fn real_main<I, T>(args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    // Exactly one argument; `-h`/`--help` only counts when it is that one.
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let [program, data_dir] = args.as_slice() else {
        println!("{}", usage());
        return 1;
    };
    if data_dir == "-h" || data_dir == "--help" {
        println!("{}", usage());
        return 0;
    }

    // `--` keeps a data directory starting with `-` from parsing as a flag.
    let cli = match Cli::try_parse_from([program.clone(), "--".into(), data_dir.clone()]) {
        Ok(cli) => cli,
        Err(e) => {
            println!("{e}");
            return 1;
        }
    };

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            println!("Error loading configuration: {e:#}");
            return 1;
        }
    };
    init_logging(&config);

    let mut migrator = match Migrator::with_config(&cli.data_dir, &config) {
        Ok(migrator) => migrator,
        Err(e) => {
            println!("Error creating migrator: {e}");
            return 1;
        }
    };

    let mut updates = migrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            println!("{}: {:.2}%", update.op, update.progress);
        }
    });

    let start = Instant::now();
    // The copy is blocking I/O; the migrator (and its progress sender) is
    // dropped when the closure returns, which ends the printer.
    let result = tokio::task::spawn_blocking(move || migrator.migrate()).await;
    if let Err(e) = printer.await {
        debug!(error = %e, "progress printer ended abnormally");
    }

    match result {
        Ok(Ok(true)) => {
            println!("Migration completed in {:?}", start.elapsed());
            0
        }
        Ok(Ok(false)) => {
            println!("Nothing to do: migration has already been completed");
            0
        }
        Ok(Err(e)) => {
            println!("Migration failed: {e}");
            1
        }
        Err(e) => {
            println!("Migration failed: {e}");
            1
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    ExitCode::from(real_main(std::env::args_os()).await)
}
