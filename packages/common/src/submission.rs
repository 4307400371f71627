use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{BlobKey, StorageError};

/// Hard upper bound on files in one submission.
pub const MAX_FILES_PER_SUBMISSION: usize = 5;

/// Default per-file size limit (100 MiB). Files must be strictly smaller.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Kind of media stored in a submission file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
}

impl FileKind {
    /// Derive the kind from a declared MIME type.
    ///
    /// Only `image/*` and `video/*` are accepted.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("image/") {
            Some(Self::Image)
        } else if content_type.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// One stored file of a submission. Embedded in the submission record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SubmissionFile {
    /// Blob store key.
    #[schema(example = "submissions/u1-1700000000000-0-cat.png")]
    pub path: String,
    /// Byte length at upload time.
    #[schema(example = 48213)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl SubmissionFile {
    /// Resolve the stored path into a blob key.
    pub fn key(&self) -> Result<BlobKey, StorageError> {
        BlobKey::parse(&self.path)
    }
}

/// A tagged group of media files, as held by the metadata store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    /// Identifier of the creating user.
    pub uid: String,
    /// Free-text label as entered by the user.
    pub tags: String,
    /// Files in upload order.
    pub files: Vec<SubmissionFile>,
    pub created_at: DateTime<Utc>,
    /// Set once the submission is soft-deleted; never cleared.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A submission record that has not been stored yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSubmission {
    pub uid: String,
    pub tags: String,
    pub files: Vec<SubmissionFile>,
    pub created_at: DateTime<Utc>,
}
