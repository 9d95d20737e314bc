// mariadb-backup-s3/src/storage/target.rs
use percent_encoding::percent_decode_str;
use url::Url;

use crate::errors::{BackupError, Result};

pub const SUPPORTED_SCHEME: &str = "s3";

/// Where backups go: a bucket, a key prefix inside it and the optional
/// S3-compatible endpoint settings carried in the URL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub bucket: String,
    pub prefix: String,
    pub endpoint: Option<String>,
    pub force_path_style: Option<bool>,
}

impl StorageTarget {
    /// Parses a storage URL such as
    /// `s3://my-bucket/my-folder?endpoint=http://minio:9000&force_path_style=true`.
    ///
    /// The prefix is the URL path without surrounding slashes; an empty prefix
    /// means the bucket root. `force_path_style` is only `true` for the exact
    /// literal `true`, and stays unset when the parameter is absent.
    pub fn resolve(raw: &str) -> Result<Self> {
        let invalid = |reason: String| BackupError::InvalidTarget {
            url: redact(raw),
            reason,
        };

        let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

        if parsed.scheme() != SUPPORTED_SCHEME {
            return Err(invalid(format!(
                "unsupported scheme `{}`, expected `{}`",
                parsed.scheme(),
                SUPPORTED_SCHEME
            )));
        }

        let bucket = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing bucket name".to_string()))?
            .to_string();

        let prefix = percent_decode_str(parsed.path())
            .decode_utf8()
            .map_err(|e| invalid(format!("prefix is not valid UTF-8: {}", e)))?
            .trim_matches('/')
            .to_string();

        // a repeated parameter counts with its first value only
        let query_param = |wanted: &str| {
            parsed
                .query_pairs()
                .find(|(name, _)| name == wanted)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };
        let endpoint = query_param("endpoint");
        let force_path_style = query_param("force_path_style").map(|value| value == "true");

        Ok(StorageTarget {
            bucket,
            prefix,
            endpoint,
            force_path_style,
        })
    }

    /// Key of the object holding a backup named `file_name`.
    pub fn object_key(&self, file_name: &str) -> String {
        if self.prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.prefix, file_name)
        }
    }

    /// Listing prefix covering every backup under this target, and nothing
    /// from sibling prefixes that merely share a leading string.
    pub fn listing_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }
}

/// Strips userinfo so credentials embedded in a URL never reach logs.
fn redact(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => raw.to_string(),
    }
}
