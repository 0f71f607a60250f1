use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{ObjectStore, ObjectStoreError};

/// Blobs as plain files under one directory. `locate` yields an absolute
/// path, so the vectorizer can run from any working directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

/// Map a missing file to `NotFound`, anything else to `Io`.
fn not_found_as(key: &str, e: std::io::Error) -> ObjectStoreError {
    match e.kind() {
        ErrorKind::NotFound => ObjectStoreError::NotFound(key.to_string()),
        _ => ObjectStoreError::Io(e),
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        tokio::fs::write(self.path_of(key), &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        tokio::fs::read(self.path_of(key))
            .await
            .map(Bytes::from)
            .map_err(|e| not_found_as(key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        match tokio::fs::remove_file(self.path_of(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(tokio::fs::try_exists(self.path_of(key)).await?)
    }

    async fn locate(&self, key: &str) -> Result<String, ObjectStoreError> {
        let path = self.path_of(key);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_as(key, e))?;
        if !meta.is_file() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        Ok(path.to_string_lossy().into_owned())
    }
}
