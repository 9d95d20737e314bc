pub(crate) mod s3;
pub(crate) mod target;

#[cfg(test)]
pub(crate) mod memory;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use target::StorageTarget;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the next page, `None` once the listing is exhausted.
    pub next: Option<String>,
}

/// The slice of an object store the backup flow relies on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `body` as `key`.
    async fn put(&self, bucket: &str, key: &str, content_type: &str, body: &Path) -> Result<()>;

    /// Lists one page of keys under `prefix`, in lexical key order.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// Deletes every key in `keys`. Fails if any of them could not be deleted.
    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<()>;
}
