// mariadb-backup-s3/src/config/mod.rs
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::debug;
use which::which;

use crate::errors::{BackupError, Result};
use crate::storage::StorageTarget;

/// Command line, with every option also readable from the environment
/// (and therefore from a `.env` file loaded before parsing).
#[derive(Debug, Parser)]
#[command(
    name = "mariadb-backup-s3",
    version,
    about = "Snapshot a running MariaDB server with mariabackup and ship it to S3"
)]
pub struct Cli {
    /// Database user
    #[arg(long = "db-user", env = "MARIADB__USER", default_value = "root")]
    pub db_user: String,

    /// Database password
    #[arg(
        long = "db-password",
        env = "MARIADB__PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub db_password: String,

    /// mariabackup executable (name on PATH or absolute path)
    #[arg(long, env = "MARIADB__BACKUP_BIN", default_value = "mariabackup")]
    pub mariabackup_bin: String,

    /// Storage URL, e.g. s3://my-bucket/my-folder
    #[arg(long = "storage-url", env = "STORAGE__URL")]
    pub storage_url: String,

    /// Number of backups to keep under the storage prefix (0 keeps all)
    #[arg(long = "max-count", env = "BACKUP__LIMITS__MAX_COUNT", default_value_t = 0)]
    pub max_count: usize,

    /// Threads mariabackup may use (defaults to the number of CPUs)
    #[arg(long, env = "BACKUP__PARALLEL")]
    pub parallel: Option<NonZeroUsize>,

    /// How the snapshot directory is archived
    #[arg(long, env = "BACKUP__COMPRESSION", value_enum, default_value_t = CompressionChoice::Auto)]
    pub compression: CompressionChoice,

    /// Directory for the working copy and the archive
    #[arg(long = "temp-dir", env = "BACKUP__TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompressionChoice {
    /// pigz when it is on PATH, built-in gzip otherwise
    Auto,
    /// tar piped through pigz
    Pigz,
    /// in-process tar + gzip
    Builtin,
}

/// Resolved compression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Pigz,
    Builtin,
}

#[derive(Clone)]
pub struct MariaDbConfig {
    pub user: String,
    pub password: String,
    pub backup_bin: String,
}

impl fmt::Debug for MariaDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MariaDbConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("backup_bin", &self.backup_bin)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub max_count: usize,
    pub parallel: usize,
    pub compression: Compression,
    pub temp_root: PathBuf,
}

/// Everything a backup run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mariadb: MariaDbConfig,
    pub storage: StorageTarget,
    pub backup: BackupConfig,
}

impl AppConfig {
    /// Validates the parsed command line and resolves defaults that depend on
    /// the host (CPU count, installed tools, temp directory).
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let storage = StorageTarget::resolve(&cli.storage_url)?;

        which(&cli.mariabackup_bin).map_err(|e| {
            BackupError::Config(format!(
                "{} executable not found: {}. Please ensure the MariaDB backup tools are installed and in your PATH.",
                cli.mariabackup_bin, e
            ))
        })?;

        let compression = match cli.compression {
            CompressionChoice::Pigz => {
                which("pigz").map_err(|e| {
                    BackupError::Config(format!("pigz compression requested but not found: {}", e))
                })?;
                Compression::Pigz
            }
            choice => resolve_compression(choice, which("pigz").is_ok()),
        };

        let config = Self::assemble(cli, storage, compression);
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    fn assemble(cli: Cli, storage: StorageTarget, compression: Compression) -> Self {
        let parallel = cli
            .parallel
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get);

        AppConfig {
            mariadb: MariaDbConfig {
                user: cli.db_user,
                password: cli.db_password,
                backup_bin: cli.mariabackup_bin,
            },
            storage,
            backup: BackupConfig {
                max_count: cli.max_count,
                parallel,
                compression,
                temp_root: cli.temp_dir.unwrap_or_else(std::env::temp_dir),
            },
        }
    }
}

fn resolve_compression(choice: CompressionChoice, pigz_available: bool) -> Compression {
    match choice {
        CompressionChoice::Pigz => Compression::Pigz,
        CompressionChoice::Builtin => Compression::Builtin,
        CompressionChoice::Auto if pigz_available => Compression::Pigz,
        CompressionChoice::Auto => Compression::Builtin,
    }
}
