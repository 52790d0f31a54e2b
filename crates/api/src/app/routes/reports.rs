use axum::{extract::Extension, response::IntoResponse, Json};

use crate::context::PrincipalContext;

/// GET /reports
///
/// Reaching the handler means the caller holds `REPORT_VIEW` in the
/// configured organization scope.
pub async fn list_reports(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "requested_by": principal.user_id().to_string(),
        "reports": [],
    }))
}
