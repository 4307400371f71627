use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

/// Authenticated caller extracted from the `Authorization: Bearer <token>` header.
///
/// Add this as a handler parameter to require authentication. Admin-only
/// handlers call [`require_admin`](AuthUser::require_admin) in the body.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let claims = jwt::verify(&state.config.auth.jwt_secret, token)
            .map_err(|_| AppError::TokenInvalid)?;
        if claims.sub.trim().is_empty() {
            return Err(AppError::TokenInvalid);
        }

        Ok(AuthUser {
            uid: claims.sub,
            is_admin: claims.admin,
        })
    }
}
