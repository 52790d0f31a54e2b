//! Operator routes: session revocation and permission cache control.
//!
//! Every route here is gated on the admin role through the policy table.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, info};

use authgate_auth::explain;
use authgate_core::{SessionId, UserId};
use authgate_events::{BusError, MutationBus, PermissionMutation};
use authgate_infra::PermissionScope;

use crate::app::dto::{ExplainRequest, ScopeQuery, StoreChange};
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

pub const SESSION_PATH: &str = "/admin/sessions/:user_id/:session_id";
pub const REFRESH_PATH: &str = "/admin/permissions/:user_id/refresh";
pub const CACHED_PATH: &str = "/admin/permissions/:user_id/cached";
pub const MUTATIONS_PATH: &str = "/admin/mutations";
pub const PUBLISH_PATH: &str = "/admin/mutations/publish";
pub const EXPLAIN_PATH: &str = "/admin/explain";

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route(SESSION_PATH, delete(revoke_session))
        .route(REFRESH_PATH, post(refresh_permissions))
        .route(CACHED_PATH, get(cached_permissions))
        .route(MUTATIONS_PATH, post(apply_mutation))
        .route(PUBLISH_PATH, post(publish_mutation))
        .route(EXPLAIN_PATH, get(explain_query))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// DELETE /admin/sessions/:user_id/:session_id - Revoke a session
pub async fn revoke_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((user_id, session_id)): Path<(UserId, SessionId)>,
) -> axum::response::Response {
    match services.sessions.revoke(user_id, session_id).await {
        Ok(revoked) => {
            info!(
                operator = %principal.user_id(),
                %user_id,
                %session_id,
                revoked,
                "operator revoked session"
            );
            (StatusCode::OK, Json(serde_json::json!({ "revoked": revoked }))).into_response()
        }
        Err(err) => {
            errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "cache_error", err.to_string())
        }
    }
}

/// POST /admin/permissions/:user_id/refresh - Force-refresh one cached scope
pub async fn refresh_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<UserId>,
    Query(scope): Query<ScopeQuery>,
) -> axum::response::Response {
    match services
        .orchestrator
        .force_refresh(user_id, scope.organization_id)
        .await
    {
        Ok(set) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "scope": PermissionScope::new(user_id, scope.organization_id),
                "permissions": set,
            })),
        )
            .into_response(),
        Err(err) => errors::refresh_error_to_response(err),
    }
}

/// GET /admin/permissions/:user_id/cached - Is a fresh set cached for the scope?
pub async fn cached_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<UserId>,
    Query(scope): Query<ScopeQuery>,
) -> axum::response::Response {
    match services
        .orchestrator
        .is_cached(user_id, scope.organization_id)
        .await
    {
        Ok(cached) => {
            (StatusCode::OK, Json(serde_json::json!({ "cached": cached }))).into_response()
        }
        Err(err) => {
            errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "cache_error", err.to_string())
        }
    }
}

/// POST /admin/mutations - Commit a store change and refresh affected caches
///
/// Responds only after every affected cache entry was refreshed (or failed).
/// The refresh runs on its own task, so a client that disconnects after the
/// change was committed cannot leave the cache stale.
pub async fn apply_mutation(
    Extension(services): Extension<Arc<AppServices>>,
    Json(change): Json<StoreChange>,
) -> axum::response::Response {
    let mutation = match change.apply(&services.permission_store) {
        Ok(m) => m,
        Err(err) => return errors::store_error_to_response(err),
    };

    match services.orchestrator.handle_detached(mutation).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            error!(error = %err, "permission refresh task failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "refresh_failed", err.to_string())
        }
    }
}

/// POST /admin/mutations/publish - Hand a mutation to the background worker
pub async fn publish_mutation(
    Extension(services): Extension<Arc<AppServices>>,
    Json(mutation): Json<PermissionMutation>,
) -> axum::response::Response {
    match services.mutations.publish(mutation) {
        Ok(consumers) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "consumers": consumers })),
        )
            .into_response(),
        Err(err @ BusError::NoConsumers) => {
            errors::json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "no_mutation_consumer",
                err.to_string(),
            )
        }
        Err(err) => {
            errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "publish_error", err.to_string())
        }
    }
}

/// GET /admin/explain - Why would this query allow or deny the user?
pub async fn explain_query(
    Extension(services): Extension<Arc<AppServices>>,
    Query(req): Query<ExplainRequest>,
) -> axum::response::Response {
    let query = req.query();
    let scope = PermissionScope::new(req.user_id, query.organization_id);

    match services.permissions.resolve(scope).await {
        Ok(granted) => (StatusCode::OK, Json(explain(&query, &granted))).into_response(),
        Err(err) => errors::refresh_error_to_response(err),
    }
}
