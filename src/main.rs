//! MariaDB backup to S3
//!
//! Takes one physical backup of a running MariaDB server with mariabackup,
//! compresses it, uploads it to S3 and prunes old backups.

// mariadb-backup-s3/src/main.rs
mod backup;
mod config;
mod errors;
mod logging;
mod retention;
mod shutdown;
mod storage;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use backup::ShellExecutor;
use config::{AppConfig, Cli};
use errors::Result;
use storage::s3::S3Store;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment and flags still apply.
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match run_app(cli).await {
        Ok(()) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            if e.is_cancelled() {
                warn!("⚠️ Backup interrupted, temporary files removed");
            } else {
                error!("❌ Error: {:?}", anyhow::Error::from(e));
            }
            ExitCode::from(code)
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::from_cli(cli)?;
    let cancel = shutdown::install();

    info!(
        "🚀 Starting backup to s3://{}/{}",
        app_config.storage.bucket, app_config.storage.prefix
    );

    let store = S3Store::connect(&app_config.storage).await;
    let executor = ShellExecutor::new();

    let report = backup::run_backup_flow(&app_config, &executor, &store, &cancel).await?;
    if report.prune_failed {
        warn!("Backup {} stored, but old backups were not pruned", report.key);
    } else if !report.pruned.is_empty() {
        info!("Pruned: {}", report.pruned.join(", "));
    }
    Ok(())
}
