use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::StorageError;
use super::key::BlobKey;
use super::traits::{BlobMetadata, BlobStore, ProgressFn, TransferProgress};

const WRITE_CHUNK: usize = 64 * 1024;

/// Filesystem-backed blob store.
///
/// A key `a/b/c.png` maps to `{base_path}/a/b/c.png`. Writes go through a
/// temp file under `{base_path}/.tmp` and are renamed into place, so readers
/// never observe a partially written object. Object metadata is not persisted.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Compute the filesystem path for a given key.
    fn blob_path(&self, key: &BlobKey) -> PathBuf {
        key.segments()
            .fold(self.base_path.clone(), |path, segment| path.join(segment))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn write_temp(
        &self,
        temp_path: &PathBuf,
        data: &[u8],
        progress: ProgressFn<'_>,
    ) -> Result<(), StorageError> {
        let total_bytes = data.len() as u64;
        let mut temp_file = fs::File::create(temp_path).await?;

        progress(TransferProgress {
            bytes_transferred: 0,
            total_bytes,
        });

        let mut written: u64 = 0;
        for chunk in data.chunks(WRITE_CHUNK) {
            temp_file.write_all(chunk).await?;
            written += chunk.len() as u64;
            progress(TransferProgress {
                bytes_transferred: written,
                total_bytes,
            });
        }

        temp_file.flush().await?;
        temp_file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(
        &self,
        key: &BlobKey,
        data: &[u8],
        _metadata: &BlobMetadata,
        progress: ProgressFn<'_>,
    ) -> Result<(), StorageError> {
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let temp_path = self.temp_path();
        if let Err(e) = self.write_temp(&temp_path, data, progress).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        let blob_path = self.blob_path(key);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
