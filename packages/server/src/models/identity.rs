use serde::{Deserialize, Serialize};

use crate::identity::CustomClaims;

/// Account about to be created by the identity provider.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct BeforeCreateRequest {
    #[schema(example = "admin@example.com")]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct BeforeCreateResponse {
    /// Present only when claims should be attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_claims: Option<CustomClaims>,
}
