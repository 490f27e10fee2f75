//! Object storage gateway.
//!
//! The job executor only ever needs two operations: pull the reference
//! sample down to a local file, and push the generated audio back up. Both
//! go through [`StorageGateway`] so the backend (S3 or a local directory)
//! is chosen once from configuration.

pub mod local;
pub mod s3;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::LocalStorage;
pub use s3::S3Storage;

/// Errors returned by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested object does not exist.
    #[error("object '{key}' not found in {location}")]
    NotFound { location: String, key: String },

    /// The local file to upload does not exist.
    #[error("local file not found: {}", .0.display())]
    MissingLocalFile(PathBuf),

    /// The transfer itself failed (network, permissions, service error).
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetch/store contract for the object store.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Download `key` into `local_dir`, returning the path of the local copy.
    async fn fetch(&self, key: &str, local_dir: &Path) -> Result<PathBuf, StorageError>;

    /// Upload `local_path` under `key`, returning the public locator.
    async fn store(&self, local_path: &Path, key: &str) -> Result<String, StorageError>;
}

/// Which backend to build, serializable so it can be handed to a worker
/// process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    S3 {
        bucket: String,
        /// Custom endpoint for S3-compatible stores.
        #[serde(default)]
        endpoint_url: Option<String>,
    },
    Local {
        root: PathBuf,
    },
}

/// Build the configured backend.
pub async fn connect(config: &StorageConfig) -> Arc<dyn StorageGateway> {
    match config {
        StorageConfig::S3 {
            bucket,
            endpoint_url,
        } => Arc::new(S3Storage::connect(bucket.clone(), endpoint_url.clone()).await),
        StorageConfig::Local { root } => Arc::new(LocalStorage::new(root.clone())),
    }
}

/// Local file name for a downloaded object: the last path segment of `key`.
pub fn local_file_name(key: &str) -> &str {
    key.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("object")
}
