use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::error::StorageError;
use super::key::BlobKey;
use super::traits::{BlobMetadata, BlobStore, ProgressFn, TransferProgress};

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    metadata: BlobMetadata,
}

/// In-process blob store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<BlobKey, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<BlobKey, StoredBlob>> {
        // A poisoned map is still structurally valid.
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All stored keys in lexical order.
    pub fn keys(&self) -> Vec<BlobKey> {
        self.lock().keys().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Metadata recorded with an object, if present.
    pub fn metadata(&self, key: &BlobKey) -> Option<BlobMetadata> {
        self.lock().get(key).map(|b| b.metadata.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &BlobKey,
        data: &[u8],
        metadata: &BlobMetadata,
        progress: ProgressFn<'_>,
    ) -> Result<(), StorageError> {
        let total_bytes = data.len() as u64;
        progress(TransferProgress {
            bytes_transferred: 0,
            total_bytes,
        });

        self.lock().insert(
            key.clone(),
            StoredBlob {
                data: data.to_vec(),
                metadata: metadata.clone(),
            },
        );

        progress(TransferProgress {
            bytes_transferred: total_bytes,
            total_bytes,
        });
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        Ok(self.lock().contains_key(key))
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        Ok(self.lock().remove(key).is_some())
    }
}
