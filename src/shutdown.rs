use std::future::Future;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::errors::{BackupError, Result};

/// Returns a token that is cancelled on the first SIGINT or SIGTERM.
pub fn install() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling backup");
                    trigger.cancel();
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("Interrupt received, cancelling backup"),
            _ = terminate.recv() => warn!("SIGTERM received, cancelling backup"),
        }
        trigger.cancel();
    });

    token
}

/// Runs `fut` unless `cancel` fires first, in which case the future is
/// dropped and `Cancelled` is returned.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackupError::Cancelled),
        value = fut => Ok(value),
    }
}
