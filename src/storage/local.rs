//! Local filesystem backend.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{IoSnafu, ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// A directory on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Absolute directory, without a trailing slash unless it is `/`.
    pub path: String,
}

impl LocalConfig {
    pub(super) fn from_path(path: &str) -> Self {
        let trimmed = path.trim_end_matches('/');
        Self {
            path: if trimmed.is_empty() { "/" } else { trimmed }.to_string(),
        }
    }
}

impl StorageProvider {
    /// Create the directory if needed and root the store at its canonical path.
    pub(super) async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.path)
            .await
            .context(IoSnafu)?;
        let root = tokio::fs::canonicalize(&config.path)
            .await
            .context(IoSnafu)?;

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new_with_prefix(&root).context(ObjectStoreSnafu)?);

        Ok(Self {
            canonical_url: format!("file://{}", root.display()),
            config: BackendConfig::Local(config),
            object_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_and_canonicalizes_root() {
        let dir = TempDir::new().unwrap();
        let url = format!("{}/./warehouse/", dir.path().display());

        let storage = StorageProvider::for_url_with_options(&url, HashMap::new())
            .await
            .unwrap();

        let root = dir.path().canonicalize().unwrap().join("warehouse");
        assert!(root.is_dir());
        assert_eq!(storage.canonical_url(), format!("file://{}", root.display()));

        storage
            .put("customer_dim/part.ndjson", Bytes::from_static(b"{}\n"))
            .await
            .unwrap();
        assert!(root.join("customer_dim/part.ndjson").is_file());
    }
}
