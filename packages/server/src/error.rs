use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use serde::Serialize;

use crate::metadata::MetadataError;
use crate::pipeline::PipelineError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `PERMISSION_DENIED`, `NOT_FOUND`, `UPLOAD_FAILED`,
    /// `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "You can only upload up to 5 files")]
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    /// Some files of a submission could not be stored.
    UploadFailed { failed: usize, total: usize },
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Administrator access required".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::UploadFailed { failed, total } => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    code: "UPLOAD_FAILED",
                    message: format!("{failed} of {total} files could not be uploaded"),
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => AppError::Validation(msg),
            PipelineError::NotFound(id) => AppError::NotFound(format!("Submission {id} not found")),
            PipelineError::UploadFailed {
                failed,
                total,
                source,
            } => {
                tracing::warn!(failed, total, error = %source, "Submission upload failed");
                AppError::UploadFailed { failed, total }
            }
            PipelineError::Storage(StorageError::SizeLimitExceeded { actual, limit }) => {
                AppError::Validation(format!("File of {actual} bytes exceeds the {limit} byte limit"))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
