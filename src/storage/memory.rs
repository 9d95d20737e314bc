// In-memory ObjectStore used by tests.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{ListPage, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub body: Vec<u8>,
}

pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    page_size: usize,
    pub fail_put: bool,
    /// `put` never completes; only cancellation gets past it.
    pub block_put: bool,
    pub fail_list: bool,
    pub fail_delete: bool,
    pub list_calls: AtomicUsize,
    pub delete_calls: Mutex<Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            page_size,
            fail_put: false,
            block_put: false,
            fail_list: false,
            fail_delete: false,
            list_calls: AtomicUsize::new(0),
            delete_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_keys(page_size: usize, bucket: &str, keys: &[&str]) -> Self {
        let store = Self::new(page_size);
        for key in keys {
            store.insert(bucket, key, b"old backup");
        }
        store
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                content_type: "application/x-gzip".to_string(),
                body: body.to_vec(),
            },
        );
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn deleted(&self) -> Vec<Vec<String>> {
        self.delete_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, bucket: &str, key: &str, content_type: &str, body: &Path) -> Result<()> {
        if self.fail_put {
            anyhow::bail!("injected put failure");
        }
        if self.block_put {
            std::future::pending::<()>().await;
        }
        let bytes = tokio::fs::read(body)
            .await
            .with_context(|| format!("Failed to read {}", body.display()))?;
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                content_type: content_type.to_string(),
                body: bytes,
            },
        );
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            anyhow::bail!("injected list failure");
        }

        let start: usize = match continuation {
            Some(token) => token.parse().context("bad continuation token")?,
            None => 0,
        };
        let matching: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        let end = (start + self.page_size).min(matching.len());
        let next = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage {
            keys: matching[start..end].to_vec(),
            next,
        })
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<()> {
        self.delete_calls.lock().unwrap().push(keys.to_vec());
        if self.fail_delete {
            anyhow::bail!("injected delete failure");
        }
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}
