use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::metadata::{SubmissionQuery, Subscription};
use crate::models::submission::{
    CreateSubmissionResponse, DeleteSubmissionsRequest, SubmissionListQuery,
    SubmissionListResponse, SubmissionResponse,
};
use crate::pipeline::{UploadEvent, UploadFile};
use crate::state::AppState;
use crate::utils::filename::content_disposition_value;

const MAX_LIST_LIMIT: u64 = 1000;

/// Multipart overhead allowed on top of the file payloads.
const MULTIPART_SLACK: u64 = 1024 * 1024;

/// Body limit for submission uploads, derived from the upload limits.
pub fn submission_upload_body_limit(config: &AppConfig) -> DefaultBodyLimit {
    let payload = config
        .upload
        .max_file_size
        .saturating_mul(config.upload.effective_max_files() as u64)
        .saturating_add(MULTIPART_SLACK);
    DefaultBodyLimit::max(usize::try_from(payload).unwrap_or(usize::MAX))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Submissions",
    operation_id = "createSubmission",
    summary = "Create a submission",
    description = "Uploads 1-5 image or video files under one tag string. The `tags` field is \
        text; each `files` field is one file. The record is created only if every file was stored.",
    request_body(content_type = "multipart/form-data", description = "Tags and files"),
    responses(
        (status = 201, description = "Submission created", body = CreateSubmissionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 502, description = "Storage failure (UPLOAD_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(uid = %auth_user.uid))]
pub async fn create_submission(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let limits = state.uploads.limits();
    let max_files = limits.effective_max_files();

    let mut tags = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("tags") => {
                tags = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read tags: {e}")))?;
            }
            Some("files") | Some("file") => {
                if files.len() >= max_files {
                    return Err(AppError::Validation(format!(
                        "You can only upload up to {max_files} files"
                    )));
                }
                files.push(read_file_field(field, limits.max_file_size).await?);
            }
            _ => {}
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<UploadEvent>();
    let progress_log = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(
                index = event.index,
                status = ?event.status,
                percent = event.percent,
                "Upload progress"
            );
        }
    });

    let result = state
        .uploads
        .submit(&tags, files, &auth_user.uid, Some(tx))
        .await;
    // The sender is gone once submit returns, so the logger drains and exits.
    let _ = progress_log.await;

    let id = result?;
    Ok((StatusCode::CREATED, Json(CreateSubmissionResponse { id })))
}

/// Read one file part, failing as soon as it reaches the size limit.
async fn read_file_field(mut field: Field<'_>, max_size: u64) -> Result<UploadFile, AppError> {
    let name = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
    let content_type = match field.content_type() {
        Some(ct) if ct != "application/octet-stream" => ct.to_string(),
        _ => mime_guess::from_path(&name)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".into()),
    };

    let mut data = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read file '{name}': {e}")))?
    {
        if (data.len() + chunk.len()) as u64 >= max_size {
            return Err(AppError::Validation(format!(
                "File '{name}' must be smaller than {max_size} bytes"
            )));
        }
        data.extend_from_slice(&chunk);
    }

    Ok(UploadFile {
        name,
        content_type,
        data,
    })
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Submissions",
    operation_id = "listSubmissions",
    summary = "List live submissions",
    description = "Returns submissions that are not soft-deleted, newest first. Admin only.",
    params(SubmissionListQuery),
    responses(
        (status = 200, description = "Submission list", body = SubmissionListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, params))]
pub async fn list_submissions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<SubmissionListQuery>,
) -> Result<Json<SubmissionListResponse>, AppError> {
    auth_user.require_admin()?;

    let mut query = SubmissionQuery::live();
    if let Some(uid) = params.uid.filter(|u| !u.trim().is_empty()) {
        query = query.for_uid(uid);
    }
    if let Some(limit) = params.limit {
        query = query.with_limit(limit.clamp(1, MAX_LIST_LIMIT));
    }

    let submissions = state.metadata.query(&query).await?;
    Ok(Json(submissions.into()))
}

#[utoipa::path(
    get,
    path = "/live",
    tag = "Submissions",
    operation_id = "streamSubmissions",
    summary = "Stream live submissions",
    description = "Server-sent events. Each `snapshot` event carries the complete list of live \
        submissions and replaces the previous one. Admin only.",
    responses(
        (status = 200, description = "SSE stream of snapshots", content_type = "text/event-stream"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn stream_submissions(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    auth_user.require_admin()?;

    let subscription = Subscription::new(state.metadata.clone(), SubmissionQuery::live());
    let stream = subscription.into_stream().map(|snapshot| {
        let event = match snapshot {
            Ok(submissions) => {
                let body = SubmissionListResponse::from(submissions);
                Event::default()
                    .event("snapshot")
                    .json_data(body)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Failed to encode snapshot");
                        Event::default().event("error").data("encode failed")
                    })
            }
            Err(e) => {
                warn!(error = %e, "Live query failed");
                Event::default().event("error").data("query failed")
            }
        };
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Submissions",
    operation_id = "getSubmission",
    summary = "Get a submission",
    params(("id" = Uuid, Path, description = "Submission ID")),
    responses(
        (status = 200, description = "Submission", body = SubmissionResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found or deleted (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(submission_id = %id))]
pub async fn get_submission(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionResponse>, AppError> {
    auth_user.require_admin()?;
    let submission = find_live_submission(&state, id).await?;
    Ok(Json(submission.into()))
}

#[utoipa::path(
    get,
    path = "/{id}/archive",
    tag = "Submissions",
    operation_id = "downloadSubmissionArchive",
    summary = "Download a submission as a zip",
    description = "Entries are named `<tags>-<position>.<extension>`. Fails without a partial \
        archive if any file cannot be fetched. Admin only.",
    params(("id" = Uuid, Path, description = "Submission ID")),
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found or deleted (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(submission_id = %id))]
pub async fn download_archive(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    auth_user.require_admin()?;
    let submission = find_live_submission(&state, id).await?;
    let archive = state.archives.build_archive(&submission).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, archive.bytes.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&archive.name),
        )
        .body(Body::from(archive.bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

#[utoipa::path(
    delete,
    path = "/",
    tag = "Submissions",
    operation_id = "deleteSubmissions",
    summary = "Soft-delete submissions",
    description = "Marks every listed submission deleted in one transaction. If any id is \
        unknown nothing changes. Files are removed later by the cleanup sweep. Admin only.",
    request_body = DeleteSubmissionsRequest,
    responses(
        (status = 204, description = "Submissions marked deleted"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "An id does not exist (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip_all)]
pub async fn delete_submissions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<DeleteSubmissionsRequest>,
) -> Result<StatusCode, AppError> {
    auth_user.require_admin()?;
    state.deletes.soft_delete(&payload.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_live_submission(state: &AppState, id: Uuid) -> Result<common::Submission, AppError> {
    state
        .metadata
        .get(id)
        .await?
        .filter(|s| !s.is_deleted())
        .ok_or_else(|| AppError::NotFound("Submission not found".into()))
}
