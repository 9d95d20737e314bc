// mariadb-backup-s3/src/backup/stage.rs
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Phase;
use crate::errors::{BackupError, Result, StageFailure};

/// Runs one external pipeline step.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Executes `command_line` for `phase`. Must return `Cancelled` promptly
    /// once `cancel` fires, after stopping whatever it started.
    async fn run(&self, phase: Phase, command_line: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Runs command lines through `bash -c`, each in its own process group so
/// that cancellation reaches every process of a pipeline, not just the shell.
pub struct ShellExecutor {
    grace: Duration,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::with_grace(Duration::from_secs(10))
    }

    /// `grace` is how long processes get between SIGTERM and SIGKILL.
    pub fn with_grace(grace: Duration) -> Self {
        ShellExecutor { grace }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for ShellExecutor {
    async fn run(&self, phase: Phase, command_line: &str, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackupError::StageExecution {
                phase,
                stderr: String::new(),
                source: StageFailure::Spawn(e),
            })?;
        // process_group(0) made the child a group leader, so its pid is the pgid.
        let pgid = child.id();
        debug!("Started {} stage as pid {:?}", phase, pgid);

        let stderr_pipe = child.stderr.take();
        let mut stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = waited else {
            warn!("Cancelling {} stage", phase);
            terminate(pgid, &mut child, self.grace).await;
            stderr_task.abort();
            return Err(BackupError::Cancelled);
        };

        // Background processes left by the shell can keep stderr open after
        // it exits; they still belong to the group and must honor cancel.
        let collected = tokio::select! {
            collected = &mut stderr_task => Some(collected),
            _ = cancel.cancelled() => None,
        };

        let Some(collected) = collected else {
            warn!("Cancelling {} stage with leftover processes", phase);
            if let Some(pgid) = pgid {
                signal_group(pgid, libc::SIGTERM);
                if tokio::time::timeout(self.grace, &mut stderr_task).await.is_err() {
                    warn!("Process group {} ignored SIGTERM, killing it", pgid);
                    signal_group(pgid, libc::SIGKILL);
                }
            }
            stderr_task.abort();
            return Err(BackupError::Cancelled);
        };

        let stderr = collected
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(BackupError::StageExecution {
                phase,
                stderr,
                source: StageFailure::Exit(status),
            }),
            Err(e) => Err(BackupError::StageExecution {
                phase,
                stderr,
                source: StageFailure::Io(e),
            }),
        }
    }
}

/// SIGTERM to the child's process group, SIGKILL if it outlives `grace`.
async fn terminate(pgid: Option<u32>, child: &mut Child, grace: Duration) {
    let Some(pgid) = pgid else {
        return;
    };

    signal_group(pgid, libc::SIGTERM);
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!("Process group {} ignored SIGTERM, killing it", pgid);
        signal_group(pgid, libc::SIGKILL);
        let _ = child.wait().await;
    }
}

fn signal_group(pgid: u32, signal: libc::c_int) {
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, signal) };
    if rc != 0 {
        debug!(
            "killpg({}, {}) failed: {}",
            pgid,
            signal,
            std::io::Error::last_os_error()
        );
    }
}
