// mariadb-backup-s3/src/retention/mod.rs
//! Keeps only the newest backups under a prefix.
//!
//! Backup keys end in a `YYYY-MM-DD-HH-MM-SS` UTC timestamp, so the lexical
//! order of keys is also their age order. The whole listing is gathered
//! before anything is decided; a retain/delete split computed per page would
//! be wrong as soon as the listing spans more than one page.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{BackupError, Result};
use crate::shutdown::cancellable;
use crate::storage::ObjectStore;

/// Result of one pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub listed: usize,
    pub deleted: Vec<String>,
}

/// Deletes the oldest objects under `prefix` so that at most `max_count`
/// remain. `max_count == 0` disables retention entirely.
pub async fn prune(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    max_count: usize,
    cancel: &CancellationToken,
) -> Result<PruneOutcome> {
    if max_count == 0 {
        debug!("Retention disabled, skipping cleanup");
        return Ok(PruneOutcome::default());
    }

    let keys = list_all_keys(store, bucket, prefix, cancel).await?;
    let listed = keys.len();

    let to_delete = select_expired(keys, max_count);
    if to_delete.is_empty() {
        debug!("Found {} backups, limit is {}, nothing to delete", listed, max_count);
        return Ok(PruneOutcome { listed, deleted: Vec::new() });
    }

    info!(
        "Found {} backups, {} will be deleted",
        listed,
        to_delete.len()
    );

    cancellable(cancel, store.delete_batch(bucket, &to_delete))
        .await?
        .map_err(BackupError::cleanup)?;

    Ok(PruneOutcome { listed, deleted: to_delete })
}

/// Follows continuation tokens until the listing is exhausted.
async fn list_all_keys(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut continuation = None;

    loop {
        let page = cancellable(cancel, store.list_page(bucket, prefix, continuation))
            .await?
            .map_err(BackupError::cleanup)?;
        keys.extend(page.keys);

        match page.next {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    Ok(keys)
}

/// Picks the `len - max_count` lexically smallest keys.
fn select_expired(mut keys: Vec<String>, max_count: usize) -> Vec<String> {
    if keys.len() <= max_count {
        return Vec::new();
    }
    keys.sort_unstable();
    let expired = keys.len() - max_count;
    keys.truncate(expired);
    keys
}
