use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

/// Extra claims attached to a newly created account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomClaims {
    pub admin: bool,
}

/// Emails that receive the admin claim at account creation.
///
/// Matching is exact; an account without an email never matches.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: HashSet<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(email)
    }

    /// Claims to attach to an account being created with `email`.
    pub fn claims_for(&self, email: Option<&str>) -> Option<CustomClaims> {
        let email = email.filter(|e| !e.is_empty())?;
        if !self.contains(email) {
            return None;
        }
        info!(email, "Setting admin claim for user");
        Some(CustomClaims { admin: true })
    }
}
