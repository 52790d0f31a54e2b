//! Server-side session liveness on top of stateless tokens.
//!
//! Every issued access token is mirrored by a cache entry keyed from
//! `(user_id, session_id)`. The entry's presence with a positive TTL is the
//! *only* liveness signal: deleting it (logout, ban, password reset) revokes
//! the token before its natural expiry, and a naturally lapsed entry looks
//! exactly the same to callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use authgate_auth::AuthClaims;
use authgate_core::{SessionId, UserId};

use crate::cache::{CacheError, CacheStore};

/// Cache key of a session: `auth:user:<userId>:accessToken:<sessionId>`.
pub fn session_key(user_id: UserId, session_id: SessionId) -> String {
    format!("auth:user:{user_id}:accessToken:{session_id}")
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("token already expired; no session registered")]
    AlreadyExpired,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Registers, checks and revokes session entries.
#[derive(Clone)]
pub struct SessionRegistry {
    cache: Arc<dyn CacheStore>,
}

impl core::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Mirror a freshly issued token. The entry lives exactly as long as the
    /// token's remaining validity at `now`.
    pub async fn register(
        &self,
        claims: &AuthClaims,
        now: DateTime<Utc>,
    ) -> Result<Duration, SessionError> {
        let ttl = claims
            .remaining_validity(now)
            .ok_or(SessionError::AlreadyExpired)?;

        self.cache
            .set(
                &session_key(claims.user_id, claims.session_id),
                claims.issued_at.timestamp().to_string(),
                ttl,
            )
            .await?;

        debug!(
            user_id = %claims.user_id,
            session_id = %claims.session_id,
            ttl_secs = ttl.as_secs(),
            "session registered"
        );
        Ok(ttl)
    }

    /// Revoke a session. Returns whether a live session existed.
    pub async fn revoke(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<bool, SessionError> {
        let existed = self.cache.delete(&session_key(user_id, session_id)).await?;
        info!(%user_id, %session_id, existed, "session revoked");
        Ok(existed)
    }

    /// Remaining lifetime of a session, `None` when it is not live.
    pub async fn remaining(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Option<Duration>, SessionError> {
        Ok(self.cache.ttl(&session_key(user_id, session_id)).await?)
    }

    pub async fn is_live(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<bool, SessionError> {
        Ok(self.remaining(user_id, session_id).await?.is_some())
    }
}
