// mariadb-backup-s3/src/storage/s3.rs
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use s3::types::{Delete, ObjectIdentifier};
use tracing::{debug, info};

use super::{ListPage, ObjectStore, StorageTarget};

/// DeleteObjects accepts at most this many keys per request.
const MAX_DELETE_BATCH: usize = 1000;

const FALLBACK_REGION: &str = "us-east-1";

/// `ObjectStore` backed by the AWS SDK. Works against AWS itself and any
/// S3-compatible service reachable through the target's endpoint override.
pub struct S3Store {
    client: s3::Client,
}

impl S3Store {
    /// Builds a client from the ambient AWS configuration (environment,
    /// profile, instance metadata) with the target's endpoint settings applied.
    pub async fn connect(target: &StorageTarget) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = s3::config::Builder::from(&sdk_config);
        if sdk_config.region().is_none() {
            builder = builder.region(Region::new(FALLBACK_REGION));
        }
        if let Some(endpoint) = &target.endpoint {
            debug!(endpoint = %endpoint, "Using custom S3 endpoint");
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(force_path_style) = target.force_path_style {
            builder = builder.force_path_style(force_path_style);
        }

        S3Store {
            client: s3::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, bucket: &str, key: &str, content_type: &str, body: &Path) -> Result<()> {
        info!(
            "Uploading {} to s3://{}/{}",
            body.display(),
            bucket,
            key
        );

        let stream = ByteStream::from_path(body)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", body.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(stream)
            .send()
            .await
            .with_context(|| format!("Failed to upload to S3 bucket {} with key {}", bucket, key))?;

        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .with_context(|| format!("Failed to list s3://{}/{}", bucket, prefix))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_owned))
            .collect();

        let next = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_owned)
        } else {
            None
        };

        Ok(ListPage { keys, next })
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to build object identifiers")?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .context("Failed to build delete request")?;

            let output = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .with_context(|| format!("Failed to delete {} objects from {}", chunk.len(), bucket))?;

            if let Some(failed) = output.errors().first() {
                anyhow::bail!(
                    "S3 refused to delete {} of {} objects, first was {}: {} {}",
                    output.errors().len(),
                    chunk.len(),
                    failed.key().unwrap_or("<unknown>"),
                    failed.code().unwrap_or("<no code>"),
                    failed.message().unwrap_or("")
                );
            }
        }
        Ok(())
    }
}
