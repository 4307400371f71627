//! The submission lifecycle: upload, soft delete and archive download.
//!
//! Every public operation returns `Result<_, PipelineError>`; nothing is
//! allowed to panic or escape across these boundaries.

pub mod archive;
pub mod soft_delete;
pub mod upload;

use common::storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

use crate::metadata::MetadataError;

pub use archive::{Archive, ArchiveBuilder};
pub use soft_delete::SoftDelete;
pub use upload::{UploadCoordinator, UploadEvent, UploadFile, UploadStatus};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any I/O.
    #[error("{0}")]
    Validation(String),

    /// At least one file of a batch failed to upload; no record was written.
    #[error("{failed} of {total} file uploads failed: {source}")]
    UploadFailed {
        failed: usize,
        total: usize,
        #[source]
        source: StorageError,
    },

    #[error("Blob storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    /// A referenced submission does not exist.
    #[error("Submission {0} does not exist")]
    NotFound(Uuid),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl PipelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
