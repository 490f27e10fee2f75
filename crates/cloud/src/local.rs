//! Directory-backed storage, used for development and tests.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::{local_file_name, StorageError, StorageGateway};

/// Treats a local directory as the object store; keys are relative paths.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(StorageError::Transfer(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageGateway for LocalStorage {
    async fn fetch(&self, key: &str, local_dir: &Path) -> Result<PathBuf, StorageError> {
        let source = self.object_path(key)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(StorageError::NotFound {
                location: self.root.display().to_string(),
                key: key.to_string(),
            });
        }

        tokio::fs::create_dir_all(local_dir).await?;
        let destination = local_dir.join(local_file_name(key));
        tokio::fs::copy(&source, &destination).await?;
        Ok(destination)
    }

    async fn store(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        if !tokio::fs::try_exists(local_path).await? {
            return Err(StorageError::MissingLocalFile(local_path.to_path_buf()));
        }

        let destination = self.object_path(key)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &destination).await?;
        Ok(format!("file://{}", destination.display()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn fetch_copies_object_into_local_dir() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(store.path().join("voices")).unwrap();
        std::fs::write(store.path().join("voices/ref.wav"), b"RIFF").unwrap();

        let storage = LocalStorage::new(store.path().to_path_buf());
        let local = storage
            .fetch("voices/ref.wav", &work.path().join("job"))
            .await
            .unwrap();

        assert_eq!(local, work.path().join("job/ref.wav"));
        assert_eq!(std::fs::read(local).unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn fetch_missing_object_is_not_found() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(store.path().to_path_buf());

        let err = storage.fetch("missing.wav", work.path()).await.unwrap_err();
        assert_matches!(err, StorageError::NotFound { key, .. } if key == "missing.wav");
    }

    #[tokio::test]
    async fn fetch_rejects_parent_traversal() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(store.path().to_path_buf());

        let err = storage.fetch("../etc/passwd", work.path()).await.unwrap_err();
        assert_matches!(err, StorageError::Transfer(_));
    }

    #[tokio::test]
    async fn store_returns_file_locator() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let local = work.path().join("out.wav");
        std::fs::write(&local, b"audio").unwrap();

        let storage = LocalStorage::new(store.path().to_path_buf());
        let url = storage.store(&local, "out.wav").await.unwrap();

        assert!(url.starts_with("file://"));
        assert_eq!(std::fs::read(store.path().join("out.wav")).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn store_missing_local_file_fails() {
        let store = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(store.path().to_path_buf());

        let err = storage
            .store(Path::new("/nonexistent/out.wav"), "out.wav")
            .await
            .unwrap_err();
        assert_matches!(err, StorageError::MissingLocalFile(_));
    }
}
