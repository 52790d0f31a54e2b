use chrono::{DateTime, Utc};
use serde::Serialize;

use authgate_core::{SessionId, UserId};

use crate::{AuthClaims, Role};

/// Verified caller identity attached to a request.
///
/// Only ever constructed from claims that passed signature and expiry checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_role(&self, role: &Role) -> bool {
        &self.role == role
    }
}

impl From<AuthClaims> for Principal {
    fn from(claims: AuthClaims) -> Self {
        Self {
            user_id: claims.user_id,
            session_id: claims.session_id,
            role: claims.role,
            expires_at: claims.expires_at,
        }
    }
}
