// mariadb-backup-s3/src/backup/logic.rs
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::{Builder as TempFileBuilder, TempDir, TempPath};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive::{self, ArchiveError};
use super::{Phase, StageExecutor, mariabackup};
use crate::config::{AppConfig, Compression};
use crate::errors::{BackupError, Result, StageFailure};
use crate::retention;
use crate::shutdown::cancellable;
use crate::storage::ObjectStore;

pub const CONTENT_TYPE: &str = "application/x-gzip";
const TEMP_PREFIX: &str = "mariadb";

/// Object name for a backup started at `started_at`. Lexical order of these
/// names is chronological order, which retention relies on.
pub fn backup_file_name(started_at: DateTime<Utc>) -> String {
    format!("{}.tar.gz", started_at.format("%Y-%m-%d-%H-%M-%S"))
}

/// Temporary artifacts of one run. Both are removed when the run is
/// dropped, whichever way the pipeline exits.
struct BackupRun {
    started_at: DateTime<Utc>,
    workdir: TempDir,
    archive: Option<TempPath>,
}

impl BackupRun {
    fn start(temp_root: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        let workdir = TempFileBuilder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(temp_root)
            .map_err(|source| BackupError::Workspace {
                action: "create working directory",
                source,
            })?;
        Ok(BackupRun {
            started_at,
            workdir,
            archive: None,
        })
    }

    fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn allocate_archive(&mut self, temp_root: &Path) -> Result<PathBuf> {
        let file = TempFileBuilder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tar.gz")
            .tempfile_in(temp_root)
            .map_err(|source| BackupError::Workspace {
                action: "create archive file",
                source,
            })?;
        let path = file.into_temp_path();
        let owned = path.to_path_buf();
        self.archive = Some(path);
        Ok(owned)
    }

    /// Removes the artifacts now, reporting problems instead of swallowing
    /// them the way `Drop` has to.
    fn finish(self) {
        let workdir = self.workdir.path().to_path_buf();
        if let Err(e) = self.workdir.close() {
            warn!("Failed to remove working directory {}: {}", workdir.display(), e);
        }
        if let Some(archive) = self.archive {
            let archive_path = archive.to_path_buf();
            if let Err(e) = archive.close() {
                warn!("Failed to remove archive {}: {}", archive_path.display(), e);
            }
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub key: String,
    pub pruned: Vec<String>,
    pub prune_failed: bool,
}

/// Drives one backup through snapshot, prepare, compress, upload and prune.
pub struct BackupPipeline<'a> {
    config: &'a AppConfig,
    executor: &'a dyn StageExecutor,
    store: &'a dyn ObjectStore,
    phase: Phase,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        executor: &'a dyn StageExecutor,
        store: &'a dyn ObjectStore,
    ) -> Self {
        BackupPipeline {
            config,
            executor,
            store,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<BackupReport> {
        self.run_at(Utc::now(), cancel).await
    }

    /// Runs the pipeline with an explicit start time, which names the object.
    pub async fn run_at(
        &mut self,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<BackupReport> {
        let result = self.execute(started_at, cancel).await;
        match &result {
            Ok(report) => {
                self.phase = Phase::Done;
                info!("🎉 Backup completed: {}", report.key);
            }
            Err(e) => {
                let failed_in = self.phase;
                self.phase = Phase::Failed;
                if e.is_cancelled() {
                    warn!("Backup cancelled during {} stage", failed_in);
                } else {
                    error!("Backup failed during {} stage", failed_in);
                }
            }
        }
        result
    }

    async fn execute(
        &mut self,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<BackupReport> {
        let config = self.config;
        let backup = &config.backup;

        self.advance(Phase::Snapshotting, cancel)?;
        let mut run = BackupRun::start(&backup.temp_root, started_at)?;
        info!("Working directory: {}", run.workdir().display());

        let command = mariabackup::backup_command(&config.mariadb, backup.parallel, run.workdir());
        self.executor.run(Phase::Snapshotting, &command, cancel).await?;
        info!("✓ Snapshot done: {}", run.workdir().display());

        self.advance(Phase::Preparing, cancel)?;
        let command = mariabackup::prepare_command(&config.mariadb, run.workdir());
        self.executor.run(Phase::Preparing, &command, cancel).await?;
        info!("✓ Prepare done: {}", run.workdir().display());

        self.advance(Phase::Compressing, cancel)?;
        let archive_path = run.allocate_archive(&backup.temp_root)?;
        self.compress(run.workdir(), &archive_path, cancel).await?;
        info!("✓ Compress done: {}", archive_path.display());

        self.advance(Phase::Uploading, cancel)?;
        let storage = &config.storage;
        let key = storage.object_key(&backup_file_name(run.started_at));
        cancellable(
            cancel,
            self.store.put(&storage.bucket, &key, CONTENT_TYPE, &archive_path),
        )
        .await?
        .map_err(|e| BackupError::Upload {
            key: key.clone(),
            source: e.into(),
        })?;
        info!("✓ Upload done: s3://{}/{}", storage.bucket, key);

        self.advance(Phase::Pruning, cancel)?;
        let (pruned, prune_failed) = match retention::prune(
            self.store,
            &storage.bucket,
            &storage.listing_prefix(),
            backup.max_count,
            cancel,
        )
        .await
        {
            Ok(outcome) => {
                if !outcome.deleted.is_empty() {
                    info!("✓ Prune done: removed {} old backups", outcome.deleted.len());
                }
                (outcome.deleted, false)
            }
            Err(BackupError::Cancelled) => return Err(BackupError::Cancelled),
            Err(e) => {
                warn!("Failed to cleanup old backups: {:#}", anyhow::Error::from(e));
                (Vec::new(), true)
            }
        };

        run.finish();
        Ok(BackupReport {
            key,
            pruned,
            prune_failed,
        })
    }

    fn advance(&mut self, next: Phase, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        debug!("Backup phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    async fn compress(
        &self,
        workdir: &Path,
        archive_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.config.backup.compression {
            Compression::Pigz => {
                let command = mariabackup::compress_command(workdir, archive_path);
                self.executor.run(Phase::Compressing, &command, cancel).await
            }
            Compression::Builtin => {
                let source = workdir.to_path_buf();
                let dest = archive_path.to_path_buf();
                let token = cancel.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    archive::create_tar_gz_archive(&source, &dest, &token)
                })
                .await;

                let failure = match joined {
                    Ok(Ok(())) => return Ok(()),
                    Ok(Err(ArchiveError::Cancelled)) => return Err(BackupError::Cancelled),
                    Ok(Err(ArchiveError::Io(e))) => e,
                    Err(e) => io::Error::other(e),
                };
                Err(BackupError::StageExecution {
                    phase: Phase::Compressing,
                    stderr: String::new(),
                    source: StageFailure::Io(failure),
                })
            }
        }
    }
}
