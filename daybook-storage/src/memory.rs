//! In-memory storage backend, used by tests and ephemeral servers.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Result, StorageError};
use crate::name::StoredName;
use crate::traits::BlobStorage;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: RwLock<HashMap<StoredName, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn write(&self, name: &StoredName, data: Bytes) -> Result<()> {
        self.blobs.write().insert(name.clone(), data);
        Ok(())
    }

    async fn read(&self, name: &StoredName) -> Result<Bytes> {
        self.blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn delete(&self, name: &StoredName) -> Result<()> {
        self.blobs.write().remove(name);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
