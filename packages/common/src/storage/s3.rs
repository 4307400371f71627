//! S3-compatible object storage backend (AWS S3, MinIO, R2, ...).

use ::s3::creds::Credentials;
use ::s3::{Bucket, Region};
use async_trait::async_trait;
use tracing::{debug, info};

use super::error::StorageError;
use super::key::BlobKey;
use super::traits::{BlobMetadata, BlobStore, ProgressFn, TransferProgress};
use crate::config::S3Config;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// User metadata name for the uploader; S3 stores it as `x-amz-meta-owner-uid`.
const OWNER_UID_METADATA: &str = "owner-uid";

/// Blob store backed by a single S3 bucket.
///
/// Objects are uploaded in one request, so progress is reported as a start
/// event and a completion event only.
pub struct S3BlobStore {
    bucket: Box<Bucket>,
    max_size: u64,
}

impl S3BlobStore {
    pub fn new(config: &S3Config, max_size: u64) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid S3 credentials: {e}")))?;

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid S3 region: {e}")))?,
        };

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| StorageError::Backend(format!("failed to open bucket: {e}")))?;
        if config.path_style {
            bucket.set_path_style();
        }

        info!(bucket = %config.bucket, "S3 blob store initialized");

        Ok(Self { bucket, max_size })
    }
}

fn check_status(code: u16, op: &str, key: &BlobKey) -> Result<(), StorageError> {
    match code {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        _ => Err(StorageError::Backend(format!(
            "{op} '{key}' failed with HTTP {code}"
        ))),
    }
}

/// User-defined object metadata sent alongside an upload.
fn user_metadata(metadata: &BlobMetadata) -> Vec<(&'static str, &str)> {
    metadata
        .owner_uid
        .as_deref()
        .map(|uid| (OWNER_UID_METADATA, uid))
        .into_iter()
        .collect()
}

fn is_not_found(err: &::s3::error::S3Error) -> bool {
    let msg = err.to_string();
    msg.contains("404") || msg.contains("NoSuchKey")
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &BlobKey,
        data: &[u8],
        metadata: &BlobMetadata,
        progress: ProgressFn<'_>,
    ) -> Result<(), StorageError> {
        let total_bytes = data.len() as u64;
        if total_bytes > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: total_bytes,
                limit: self.max_size,
            });
        }

        progress(TransferProgress {
            bytes_transferred: 0,
            total_bytes,
        });

        let content_type = metadata
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let mut request = self
            .bucket
            .put_object_builder(key.as_str(), data)
            .with_content_type(content_type);
        for (name, value) in user_metadata(metadata) {
            request = request.with_metadata(name, value).map_err(|e| {
                StorageError::Backend(format!("invalid metadata '{name}' for '{key}': {e}"))
            })?;
        }
        let response = request
            .execute()
            .await
            .map_err(|e| StorageError::Backend(format!("upload of '{key}' failed: {e}")))?;
        check_status(response.status_code(), "upload", key)?;

        progress(TransferProgress {
            bytes_transferred: total_bytes,
            total_bytes,
        });
        debug!(key = %key, bytes = total_bytes, "Uploaded object");
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key.as_str()).await.map_err(|e| {
            if is_not_found(&e) {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Backend(format!("download of '{key}' failed: {e}"))
            }
        })?;
        check_status(response.status_code(), "download", key)?;
        Ok(response.bytes().to_vec())
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        match self.bucket.head_object(key.as_str()).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) => check_status(code, "head", key).map(|()| true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::Backend(format!(
                "existence check of '{key}' failed: {e}"
            ))),
        }
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        // S3 deletes succeed for absent keys, so existence is checked first.
        if !self.exists(key).await? {
            return Ok(false);
        }
        let response = self
            .bucket
            .delete_object(key.as_str())
            .await
            .map_err(|e| StorageError::Backend(format!("delete of '{key}' failed: {e}")))?;
        match response.status_code() {
            404 => Ok(false),
            code => check_status(code, "delete", key).map(|()| true),
        }
    }
}
