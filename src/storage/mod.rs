//! Object storage abstraction.
//!
//! Provides a unified interface for S3, the local filesystem, and an
//! in-memory store, addressed by URL.

mod local;
mod s3;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const MEMORY_URL: &str = r"^memory://(?P<key>.*)$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Memory,
    Local,
}

fn matchers() -> &'static [(Backend, Vec<Regex>)] {
    static MATCHERS: OnceLock<Vec<(Backend, Vec<Regex>)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("storage URL pattern must compile"))
                .collect::<Vec<_>>()
        };
        vec![
            (Backend::S3, compile(&[S3_PATH, S3_ENDPOINT_URL, S3_URL])),
            (Backend::Memory, compile(&[MEMORY_URL])),
            (Backend::Local, compile(&[FILE_URI, FILE_PATH])),
        ]
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Memory { key: Option<Path> },
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, patterns) in matchers() {
            if let Some(caps) = patterns.iter().find_map(|r| r.captures(url)) {
                let key = caps
                    .name("key")
                    .map(|m| m.as_str().trim_end_matches('/'))
                    .filter(|k| !k.is_empty())
                    .map(Path::from);

                return Ok(match backend {
                    Backend::S3 => BackendConfig::S3(S3Config::from_captures(&caps, key)),
                    Backend::Memory => BackendConfig::Memory { key },
                    Backend::Local => BackendConfig::Local(LocalConfig::from_path(&caps["path"])),
                });
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Memory { key } => key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    ///
    /// Every `memory://` URL gets its own empty store; use
    /// [`StorageProvider::in_memory`] and share the provider to reuse one.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
            config @ BackendConfig::Memory { .. } => Ok(Self {
                config,
                object_store: Arc::new(InMemory::new()),
                canonical_url: url.to_string(),
            }),
        }
    }

    /// A fresh, empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            config: BackendConfig::Memory { key: None },
            object_store: Arc::new(InMemory::new()),
            canonical_url: "memory://".to_string(),
        }
    }

    /// URL this provider was created for.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// List all files below the configured location, sorted by path.
    ///
    /// Returned paths are relative to the configured key prefix.
    pub async fn list_files(&self) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();
        let prefix = self.config.key();
        let prefix_parts = prefix.map(|p| p.parts().count()).unwrap_or_default();

        let result: Result<Vec<_>, _> = self.object_store.list(prefix).try_collect().await;
        self.record(StorageOperation::List, result.is_ok(), start);

        let mut files: Vec<String> = result
            .context(ObjectStoreSnafu)?
            .into_iter()
            .map(|meta| {
                let relative: Path = meta.location.parts().skip(prefix_parts).collect();
                relative.to_string()
            })
            .collect();
        files.sort();

        debug!("Listed {} files under {}", files.len(), self.canonical_url);
        Ok(files)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &str) -> Result<Bytes, StorageError> {
        let path = Path::from(path);
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;
        self.record(StorageOperation::Get, result.is_ok(), start);

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to a path, replacing any existing object.
    pub async fn put(&self, path: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = Path::from(path);
        let start = Instant::now();
        let result = self
            .object_store
            .put(&self.qualify_path(&path), PutPayload::from(bytes))
            .await;
        self.record(StorageOperation::Put, result.is_ok(), start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn record(&self, operation: StorageOperation, ok: bool, start: Instant) {
        let status = if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest { operation, status });
        emit!(StorageRequestDuration {
            operation,
            duration: start.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_s3_url_parsing() {
        match BackendConfig::parse_url("s3://sales-bucket/raw/2024").unwrap() {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "sales-bucket");
                assert_eq!(s3.key, Some(Path::from("raw/2024")));
            }
            other => panic!("Expected S3 config, got {other:?}"),
        }
    }

    #[test]
    fn test_s3_endpoint_url_parsing() {
        match BackendConfig::parse_url("s3::http://localhost:9000/bucket/warehouse").unwrap() {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "bucket");
                assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
            }
            other => panic!("Expected S3 config, got {other:?}"),
        }
    }

    #[test]
    fn test_local_url_parsing() {
        let config = BackendConfig::parse_url("/data/warehouse/").unwrap();
        assert_eq!(
            config,
            BackendConfig::Local(LocalConfig {
                path: "/data/warehouse".to_string()
            })
        );
        let config = BackendConfig::parse_url("file:///data/in").unwrap();
        assert_eq!(
            config,
            BackendConfig::Local(LocalConfig {
                path: "/data/in".to_string()
            })
        );
    }

    #[test]
    fn test_local_root_keeps_slash() {
        assert_eq!(
            BackendConfig::parse_url("file:///").unwrap(),
            BackendConfig::Local(LocalConfig {
                path: "/".to_string()
            })
        );
    }

    #[test]
    fn test_memory_url_parsing() {
        let config = BackendConfig::parse_url("memory://scratch/area").unwrap();
        assert_eq!(
            config,
            BackendConfig::Memory {
                key: Some(Path::from("scratch/area"))
            }
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            BackendConfig::parse_url("relative/path"),
            Err(StorageError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_put_list_get() {
        let dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url_with_options(
            dir.path().to_str().unwrap(),
            HashMap::new(),
        )
        .await
        .unwrap();

        storage
            .put("b/two.ndjson", Bytes::from_static(b"{}\n"))
            .await
            .unwrap();
        storage
            .put("a/one.ndjson", Bytes::from_static(b"{}\n{}\n"))
            .await
            .unwrap();

        let files = storage.list_files().await.unwrap();
        assert_eq!(files, vec!["a/one.ndjson", "b/two.ndjson"]);
        assert_eq!(
            storage.get("a/one.ndjson").await.unwrap(),
            Bytes::from_static(b"{}\n{}\n")
        );
    }

    #[tokio::test]
    async fn test_memory_prefix_is_applied() {
        let storage =
            StorageProvider::for_url_with_options("memory://root/sub", HashMap::new())
                .await
                .unwrap();
        storage
            .put("file.json", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(storage.list_files().await.unwrap(), vec!["file.json"]);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let storage = StorageProvider::in_memory();
        let err = storage.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
