//! Local filesystem storage implementation.
//!
//! This is the default backend: one flat directory of `<uuid>.<ext>` files.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::name::StoredName;
use crate::traits::BlobStorage;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The base directory is created lazily on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn to_fs_path(&self, name: &StoredName) -> PathBuf {
        name.to_path_buf(&self.base_path)
    }
}

#[async_trait]
impl BlobStorage for LocalStorage {
    #[instrument(skip(self, data), fields(name = %name, size = data.len()))]
    async fn write(&self, name: &StoredName, data: Bytes) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        let fs_path = self.to_fs_path(name);

        // Readers of `/files/...` must never see a half-written blob.
        let part = self.base_path.join(format!(".{}.part", name));
        debug!("Writing {} bytes to {:?}", data.len(), fs_path);
        fs::write(&part, &data).await?;
        if let Err(e) = fs::rename(&part, &fs_path).await {
            let _ = fs::remove_file(&part).await;
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn read(&self, name: &StoredName) -> Result<Bytes> {
        let fs_path = self.to_fs_path(name);
        debug!("Reading from {:?}", fs_path);

        match fs::read(&fs_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn delete(&self, name: &StoredName) -> Result<()> {
        let fs_path = self.to_fs_path(name);
        debug!("Deleting {:?}", fs_path);

        match fs::remove_file(&fs_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path().join("uploads"));
        (storage, temp)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (storage, _temp) = create_test_storage();
        let name = StoredName::generate(Some("png"));
        let data = Bytes::from("fake png");

        storage.write(&name, data.clone()).await.unwrap();
        let read = storage.read(&name).await.unwrap();

        assert_eq!(read, data);
        assert!(storage.base_path().join(name.as_str()).is_file());
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let (storage, _temp) = create_test_storage();
        let name = StoredName::parse("missing.png").unwrap();

        let result = storage.read(&name).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (storage, _temp) = create_test_storage();
        let name = StoredName::generate(Some("gif"));
        storage.write(&name, Bytes::from("gif")).await.unwrap();

        storage.delete(&name).await.unwrap();
        assert!(storage.read(&name).await.unwrap_err().is_not_found());

        // Second delete is a no-op
        storage.delete(&name).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_leaves_no_partial_files() {
        let (storage, _temp) = create_test_storage();
        let name = StoredName::generate(Some("pdf"));
        storage.write(&name, Bytes::from("first")).await.unwrap();
        storage.write(&name, Bytes::from("second")).await.unwrap();

        let entries: Vec<String> = std::fs::read_dir(storage.base_path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec![name.to_string()]);
        assert_eq!(storage.read(&name).await.unwrap(), Bytes::from("second"));
    }
}
