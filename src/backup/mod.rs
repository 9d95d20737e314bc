pub(crate) mod archive;
pub(crate) mod logic;
pub(crate) mod mariabackup;
pub(crate) mod stage;

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::storage::ObjectStore;

pub use logic::{BackupPipeline, BackupReport};
pub use stage::{ShellExecutor, StageExecutor};

/// Where a backup run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Snapshotting,
    Preparing,
    Compressing,
    Uploading,
    Pruning,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Snapshotting => "snapshot",
            Phase::Preparing => "prepare",
            Phase::Compressing => "compress",
            Phase::Uploading => "upload",
            Phase::Pruning => "prune",
            Phase::Done => "done",
            Phase::Failed => "failed",
        })
    }
}

/// Public entry point for the backup process: one full backup cycle.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    executor: &dyn StageExecutor,
    store: &dyn ObjectStore,
    cancel: &CancellationToken,
) -> Result<BackupReport> {
    BackupPipeline::new(app_config, executor, store)
        .run(cancel)
        .await
}
