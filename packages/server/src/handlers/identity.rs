use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::models::identity::{BeforeCreateRequest, BeforeCreateResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/before-create",
    tag = "Identity",
    operation_id = "beforeUserCreated",
    summary = "Account-creation hook",
    description = "Called by the identity provider before an account is created. Returns \
        `custom_claims.admin = true` when the email is on the configured allow-list.",
    request_body = BeforeCreateRequest,
    responses(
        (status = 200, description = "Claims to attach", body = BeforeCreateResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip_all)]
pub async fn before_user_created(
    State(state): State<AppState>,
    AppJson(payload): AppJson<BeforeCreateRequest>,
) -> Result<Json<BeforeCreateResponse>, AppError> {
    let custom_claims = state.admins.claims_for(payload.email.as_deref());
    Ok(Json(BeforeCreateResponse { custom_claims }))
}
