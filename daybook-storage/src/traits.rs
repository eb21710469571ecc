//! Core storage trait definitions.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::name::StoredName;

/// Storage for uploaded attachment bytes.
///
/// Blobs are addressed by a flat [`StoredName`]; the database keeps the
/// original file name and MIME type.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so one backend can be shared by
/// every request handler.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Write data under the given name, overwriting any existing blob.
    async fn write(&self, name: &StoredName, data: Bytes) -> Result<()>;

    /// Read a blob.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the blob does not exist.
    async fn read(&self, name: &StoredName) -> Result<Bytes>;

    /// Delete a blob. No-op if it does not exist.
    async fn delete(&self, name: &StoredName) -> Result<()>;

    /// Delete several blobs, returning how many deletions failed.
    async fn delete_many(&self, names: &[StoredName]) -> usize {
        let mut failed = 0;
        for name in names {
            if let Err(e) = self.delete(name).await {
                tracing::warn!("Failed to delete blob {}: {}", name, e);
                failed += 1;
            }
        }
        failed
    }

    /// Get a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    #[tokio::test]
    async fn test_delete_many_counts_nothing_for_missing() {
        let storage = MemoryStorage::new();
        let a = StoredName::generate(Some("png"));
        let b = StoredName::generate(Some("png"));
        storage.write(&a, Bytes::from_static(b"a")).await.unwrap();

        let failed = storage.delete_many(&[a.clone(), b]).await;
        assert_eq!(failed, 0);
        assert!(storage.read(&a).await.unwrap_err().is_not_found());
    }
}
