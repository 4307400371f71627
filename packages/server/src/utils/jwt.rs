use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Default token lifetime.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// Bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Set by the identity hook for allow-listed accounts.
    #[serde(default)]
    pub admin: bool,
    /// Expiration timestamp.
    pub exp: usize,
}

/// Sign a token for `uid` valid for [`TOKEN_TTL_DAYS`].
pub fn sign(secret: &str, uid: &str, admin: bool) -> jsonwebtoken::errors::Result<String> {
    let expiration = Utc::now() + Duration::days(TOKEN_TTL_DAYS);
    let claims = Claims {
        sub: uid.to_owned(),
        admin,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify signature and expiry and return the claims.
pub fn verify(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
