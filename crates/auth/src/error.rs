use serde::Serialize;
use thiserror::Error;

/// Machine-readable reason attached to an authentication failure.
///
/// Only two codes exist on purpose: every cause that is not a revoked session
/// collapses into `Unauthorized`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnauthenticatedCode {
    /// Missing/malformed header, bad signature, expired or malformed token.
    Unauthorized,
    /// The token verified, but its session is no longer live.
    InvalidToken,
}

/// Per-request authorization outcome.
///
/// Configuration problems (e.g. a missing signing secret) are not represented
/// here; they abort startup instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthenticated ({0:?})")]
    Unauthenticated(UnauthenticatedCode),

    #[error("forbidden")]
    Forbidden,
}

impl AuthError {
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated(UnauthenticatedCode::Unauthorized)
    }

    pub fn invalid_token() -> Self {
        Self::Unauthenticated(UnauthenticatedCode::InvalidToken)
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// Stable message key clients branch on.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Unauthenticated(UnauthenticatedCode::Unauthorized) => "auth.UNAUTHORIZED",
            Self::Unauthenticated(UnauthenticatedCode::InvalidToken) => "auth.INVALID_TOKEN",
            Self::Forbidden => "auth.FORBIDDEN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_keys_are_stable() {
        assert_eq!(AuthError::unauthenticated().message_key(), "auth.UNAUTHORIZED");
        assert_eq!(AuthError::invalid_token().message_key(), "auth.INVALID_TOKEN");
        assert_eq!(AuthError::Forbidden.message_key(), "auth.FORBIDDEN");
    }
}
