use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use tracing::{debug, warn};

use authgate_auth::{AuthError, TokenCodec, authorize_query, check_role, explain};
use authgate_infra::{PermissionCache, PermissionScope, SessionRegistry};

use super::{AuthContext, AuthStep};

/// Token from an `Authorization: Bearer <token>` header.
///
/// The scheme must be exactly `Bearer`; anything else yields `None`.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();

    if token.is_empty() {
        return None;
    }

    Some(token)
}

// ─────────────────────────────────────────────────────────────────────────────
// Token verification
// ─────────────────────────────────────────────────────────────────────────────

/// Verifies the bearer token and attaches the identity it carries.
pub struct VerifyToken {
    codec: Arc<dyn TokenCodec>,
}

impl VerifyToken {
    pub fn new(codec: Arc<dyn TokenCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl AuthStep for VerifyToken {
    fn name(&self) -> &'static str {
        "verify_token"
    }

    fn requires_identity(&self) -> bool {
        false
    }

    fn provides_identity(&self) -> bool {
        true
    }

    async fn check(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthError> {
        let token = extract_bearer(ctx.headers).ok_or_else(AuthError::unauthenticated)?;

        let claims = self.codec.verify(token, ctx.now).map_err(|err| {
            debug!(error = %err, "token rejected");
            AuthError::unauthenticated()
        })?;

        ctx.principal = Some(claims.into());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session liveness
// ─────────────────────────────────────────────────────────────────────────────

/// Rejects verified tokens whose session entry is gone.
pub struct SessionLiveness {
    sessions: SessionRegistry,
}

impl SessionLiveness {
    pub fn new(sessions: SessionRegistry) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl AuthStep for SessionLiveness {
    fn name(&self) -> &'static str {
        "session_liveness"
    }

    async fn check(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthError> {
        let principal = ctx.principal.as_ref().ok_or_else(AuthError::unauthenticated)?;

        match self
            .sessions
            .remaining(principal.user_id, principal.session_id)
            .await
        {
            Ok(Some(ttl)) if !ttl.is_zero() => Ok(()),
            Ok(_) => {
                debug!(
                    user_id = %principal.user_id,
                    session_id = %principal.session_id,
                    "session not live"
                );
                Err(AuthError::invalid_token())
            }
            Err(err) => {
                warn!(
                    user_id = %principal.user_id,
                    error = %err,
                    "session lookup failed; failing closed"
                );
                Err(AuthError::unauthenticated())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role guard
// ─────────────────────────────────────────────────────────────────────────────

/// Enforces the route's required role, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleGuard;

#[async_trait]
impl AuthStep for RoleGuard {
    fn name(&self) -> &'static str {
        "role_guard"
    }

    async fn check(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthError> {
        check_role(ctx.principal.as_ref(), ctx.policy.required_role.as_ref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission guard
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluates the route's permission query against the caller's cached
/// permission set in the query's scope.
pub struct PermissionGuard {
    permissions: Arc<PermissionCache>,
}

impl PermissionGuard {
    pub fn new(permissions: Arc<PermissionCache>) -> Self {
        Self { permissions }
    }
}

#[async_trait]
impl AuthStep for PermissionGuard {
    fn name(&self) -> &'static str {
        "permission_guard"
    }

    async fn check(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthError> {
        let principal = ctx.principal.as_ref().ok_or_else(AuthError::unauthenticated)?;

        let Some(query) = ctx.policy.permission_query.as_ref() else {
            return Ok(());
        };
        if query.is_unconstrained() {
            return Ok(());
        }

        let scope = PermissionScope::new(principal.user_id, query.organization_id);
        let granted = self.permissions.resolve(scope).await.map_err(|err| {
            warn!(%scope, error = %err, "permission set unavailable; failing closed");
            AuthError::unauthenticated()
        })?;

        authorize_query(query, &granted).inspect_err(|_| {
            let explanation = explain(query, &granted);
            debug!(%scope, reason = %explanation.reason, "permission query denied");
        })
    }
}
