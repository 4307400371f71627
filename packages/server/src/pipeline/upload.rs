use std::sync::{Arc, Mutex};

use chrono::Utc;
use common::config::UploadConfig;
use common::storage::{BlobKey, BlobMetadata, BlobStore, StorageError, TransferProgress};
use common::{FileKind, NewSubmission, SubmissionFile};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::PipelineError;
use crate::metadata::MetadataStore;
use crate::utils::filename::{
    sanitize_key_component, truncate_key_component, validate_flat_filename,
};

/// Prefix under which all submission blobs are stored.
pub const SUBMISSIONS_PREFIX: &str = "submissions";

/// Upper bounds for the user and filename parts of a storage key. Together
/// with the prefix, timestamp and index they stay well under the blob key
/// length limit.
const MAX_UID_COMPONENT_LEN: usize = 128;
const MAX_NAME_COMPONENT_LEN: usize = 200;

/// A raw file handed to the coordinator.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Original filename as supplied by the client.
    pub name: String,
    /// Declared MIME type.
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Done,
    Failed,
}

/// Progress of one file in a batch, keyed by its position in the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadEvent {
    pub index: usize,
    pub status: UploadStatus,
    pub percent: f64,
}

/// Forwards progress for one file, dropping regressions and anything after
/// the terminal event.
struct ProgressReporter {
    index: usize,
    tx: Option<UnboundedSender<UploadEvent>>,
    /// `None` until the first event; `Some(None)` once terminal.
    last: Mutex<Option<Option<f64>>>,
}

impl ProgressReporter {
    fn new(index: usize, tx: Option<UnboundedSender<UploadEvent>>) -> Self {
        Self {
            index,
            tx,
            last: Mutex::new(None),
        }
    }

    fn send(&self, status: UploadStatus, percent: f64) {
        if let Some(tx) = &self.tx {
            // The consumer may have gone away; uploads carry on regardless.
            let _ = tx.send(UploadEvent {
                index: self.index,
                status,
                percent,
            });
        }
    }

    fn uploading(&self, progress: TransferProgress) {
        let percent = progress.percent();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(None) => {}
            Some(Some(prev)) if percent <= prev => {}
            _ => {
                *last = Some(Some(percent));
                self.send(UploadStatus::Uploading, percent);
            }
        }
    }

    fn finish(&self, status: UploadStatus) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let percent = match (*last, status) {
            (Some(None), _) => return,
            (_, UploadStatus::Done) => 100.0,
            (Some(Some(prev)), _) => prev,
            (None, _) => 0.0,
        };
        *last = Some(None);
        self.send(status, percent);
    }
}

/// A validated file with its derived storage location.
struct PreparedFile {
    key: BlobKey,
    kind: FileKind,
    file: UploadFile,
}

/// Drives the upload of one submission's files and commits the record.
#[derive(Clone)]
pub struct UploadCoordinator {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    limits: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        limits: UploadConfig,
    ) -> Self {
        Self {
            blobs,
            metadata,
            limits,
        }
    }

    pub fn limits(&self) -> &UploadConfig {
        &self.limits
    }

    /// Check count, type and size of every file without touching any store.
    pub fn validate(&self, files: &[UploadFile]) -> Result<Vec<FileKind>, PipelineError> {
        let max_files = self.limits.effective_max_files();
        if files.is_empty() {
            return Err(PipelineError::Validation(
                "Please select at least one file".into(),
            ));
        }
        if files.len() > max_files {
            return Err(PipelineError::Validation(format!(
                "You can only upload up to {max_files} files"
            )));
        }

        files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let kind = FileKind::from_content_type(&file.content_type).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Only images and videos are allowed (file {} is '{}')",
                        index + 1,
                        file.content_type
                    ))
                })?;

                if file.data.len() as u64 >= self.limits.max_file_size {
                    return Err(PipelineError::Validation(format!(
                        "File {} must be smaller than {} bytes",
                        index + 1,
                        self.limits.max_file_size
                    )));
                }

                validate_flat_filename(&file.name).map_err(|e| {
                    PipelineError::Validation(format!("File {}: {}", index + 1, e.message()))
                })?;

                Ok(kind)
            })
            .collect()
    }

    /// Upload every file concurrently, then create the submission record.
    ///
    /// The record is written only if every upload succeeded. Blobs of a
    /// failed batch are left in place with no referencing record.
    #[instrument(skip_all, fields(uid = %uid, files = files.len()))]
    pub async fn submit(
        &self,
        tags: &str,
        files: Vec<UploadFile>,
        uid: &str,
        progress: Option<UnboundedSender<UploadEvent>>,
    ) -> Result<Uuid, PipelineError> {
        if uid.trim().is_empty() {
            return Err(PipelineError::Validation("Missing user id".into()));
        }
        let kinds = self.validate(&files)?;

        let timestamp = Utc::now().timestamp_millis();
        let prepared = files
            .into_iter()
            .zip(kinds)
            .enumerate()
            .map(|(index, (file, kind))| {
                let key = storage_key(uid, timestamp, index, &file.name)?;
                Ok(PreparedFile { key, kind, file })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let uploads = prepared
            .iter()
            .enumerate()
            .map(|(index, prepared)| self.upload_one(index, prepared, uid, progress.clone()));
        let results = join_all(uploads).await;

        let total = results.len();
        let mut uploaded = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(file) => uploaded.push(file),
                Err(e) => {
                    warn!(index, path = %prepared[index].key, error = %e, "File upload failed");
                    failures.push(e);
                }
            }
        }

        if !failures.is_empty() {
            if !uploaded.is_empty() {
                let orphaned: Vec<_> = uploaded.iter().map(|f| f.path.as_str()).collect();
                warn!(?orphaned, "Submission aborted, uploaded blobs left unreferenced");
            }
            let failed = failures.len();
            let source = failures.swap_remove(0);
            return Err(PipelineError::UploadFailed {
                failed,
                total,
                source,
            });
        }

        let submission = self
            .metadata
            .create(NewSubmission {
                uid: uid.to_string(),
                tags: tags.to_string(),
                files: uploaded,
                created_at: Utc::now(),
            })
            .await
            .inspect_err(|e| {
                warn!(error = %e, "Failed to write submission record, uploaded blobs left unreferenced");
            })?;

        info!(submission_id = %submission.id, "Submission created");
        Ok(submission.id)
    }

    async fn upload_one(
        &self,
        index: usize,
        prepared: &PreparedFile,
        uid: &str,
        progress: Option<UnboundedSender<UploadEvent>>,
    ) -> Result<SubmissionFile, StorageError> {
        let reporter = ProgressReporter::new(index, progress);
        let metadata = BlobMetadata {
            content_type: Some(prepared.file.content_type.clone()),
            owner_uid: Some(uid.to_string()),
        };
        let on_progress = |p: TransferProgress| reporter.uploading(p);

        match self
            .blobs
            .put(&prepared.key, &prepared.file.data, &metadata, &on_progress)
            .await
        {
            Ok(()) => {
                reporter.finish(UploadStatus::Done);
                Ok(SubmissionFile {
                    path: prepared.key.to_string(),
                    size: prepared.file.data.len() as u64,
                    kind: prepared.kind,
                })
            }
            Err(e) => {
                reporter.finish(UploadStatus::Failed);
                Err(e)
            }
        }
    }
}

/// Derive a collision-resistant key from uploader, batch timestamp, position
/// and original filename.
pub fn storage_key(
    uid: &str,
    timestamp_millis: i64,
    index: usize,
    filename: &str,
) -> Result<BlobKey, PipelineError> {
    let name = validate_flat_filename(filename)
        .map_err(|e| PipelineError::Validation(e.message().into()))?;
    let raw = format!(
        "{SUBMISSIONS_PREFIX}/{}-{timestamp_millis}-{index}-{}",
        truncate_key_component(&sanitize_key_component(uid), MAX_UID_COMPONENT_LEN),
        truncate_key_component(&sanitize_key_component(name), MAX_NAME_COMPONENT_LEN)
    );
    Ok(BlobKey::parse(&raw)?)
}
