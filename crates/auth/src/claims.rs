use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use authgate_core::{SessionId, UserId};

use crate::Role;

/// Access-token claims (transport-agnostic).
///
/// Immutable once issued. Validity is decided purely by the signature (checked
/// by a [`TokenCodec`](crate::TokenCodec)) and the time window checked here.
/// Field names on the wire follow the registered JWT claim names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Subject / user identifier.
    #[serde(rename = "sub")]
    pub user_id: UserId,

    /// Session this token belongs to.
    #[serde(rename = "sid")]
    pub session_id: SessionId,

    /// Coarse RBAC role carried by the token.
    pub role: Role,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl AuthClaims {
    /// Time left until expiry, or `None` once the token has expired.
    pub fn remaining_validity(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim time window.
///
/// `leeway` only widens the `issued_at` check (clock skew between issuer and
/// verifier); expiry is always exact.
pub fn validate_claims(
    claims: &AuthClaims,
    now: DateTime<Utc>,
    leeway: Duration,
) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now + leeway < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
