use chrono::{DateTime, Utc};
use common::{FileKind, Submission, SubmissionFile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored file of a submission.
#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmissionFileResponse {
    /// Blob key of the stored file.
    #[schema(example = "submissions/uid123-1718000000000-0-cat.png")]
    pub path: String,
    /// Size in bytes.
    #[schema(example = 48213)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl From<SubmissionFile> for SubmissionFileResponse {
    fn from(file: SubmissionFile) -> Self {
        Self {
            path: file.path,
            size: file.size,
            kind: file.kind,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmissionResponse {
    pub id: Uuid,
    /// Uploader's user id.
    #[schema(example = "uid123")]
    pub uid: String,
    #[schema(example = "Foo Bar")]
    pub tags: String,
    pub files: Vec<SubmissionFileResponse>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            uid: submission.uid,
            tags: submission.tags,
            files: submission.files.into_iter().map(Into::into).collect(),
            created_at: submission.created_at,
            deleted_at: submission.deleted_at,
        }
    }
}

/// Live submissions, newest first.
#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmissionListResponse {
    pub submissions: Vec<SubmissionResponse>,
    pub total: u64,
}

impl From<Vec<Submission>> for SubmissionListResponse {
    fn from(submissions: Vec<Submission>) -> Self {
        let total = submissions.len() as u64;
        Self {
            submissions: submissions.into_iter().map(Into::into).collect(),
            total,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct SubmissionListQuery {
    /// Only submissions by this user.
    #[param(example = "uid123")]
    pub uid: Option<String>,
    /// Maximum number of submissions (1-1000).
    #[param(example = 50)]
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateSubmissionResponse {
    pub id: Uuid,
}

/// Request body for soft-deleting submissions.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DeleteSubmissionsRequest {
    /// Every id must exist or nothing is deleted.
    pub ids: Vec<Uuid>,
}
