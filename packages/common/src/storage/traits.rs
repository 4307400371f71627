use async_trait::async_trait;

use super::error::StorageError;
use super::key::BlobKey;

/// Byte-level progress of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Completion percentage in `0.0..=100.0`. An empty upload counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

/// Callback invoked as an upload makes progress.
pub type ProgressFn<'a> = &'a (dyn Fn(TransferProgress) + Send + Sync);

/// Metadata stored alongside an uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Declared MIME type of the object.
    pub content_type: Option<String>,
    /// Identifier of the user who uploaded the object.
    pub owner_uid: Option<String>,
}

/// Path-keyed blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    ///
    /// `progress` receives non-decreasing byte counts and always a final
    /// event where `bytes_transferred == total_bytes` on success.
    async fn put(
        &self,
        key: &BlobKey,
        data: &[u8],
        metadata: &BlobMetadata,
        progress: ProgressFn<'_>,
    ) -> Result<(), StorageError>;

    /// Retrieve all bytes of an object.
    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError>;

    /// Check whether an object exists.
    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError>;

    /// Delete an object.
    ///
    /// Returns `true` if the object was deleted, `false` if it did not exist.
    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError>;
}

/// A progress callback that ignores every event.
pub fn no_progress(_: TransferProgress) {}
