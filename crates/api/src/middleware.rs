use std::sync::Arc;

use axum::{
    extract::{MatchedPath, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::app::errors;
use crate::context::PrincipalContext;
use crate::pipeline::AuthPipeline;
use crate::policy::RoutePolicies;

#[derive(Clone)]
pub struct AuthState {
    pub pipeline: Arc<AuthPipeline>,
    pub policies: Arc<RoutePolicies>,
}

/// Runs the auth pipeline with the matched route's policy.
///
/// Must be installed with `route_layer` so the matched path is known.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let policy = state.policies.policy_for(req.method(), &path);

    match state.pipeline.authorize(req.headers(), policy, Utc::now()).await {
        Ok(principal) => {
            req.extensions_mut().insert(PrincipalContext::new(principal));
            next.run(req).await
        }
        Err(err) => errors::auth_error_response(err, req.headers()),
    }
}
