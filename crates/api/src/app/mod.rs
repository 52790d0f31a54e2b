//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (cache, session registry, permission
//!   cache, orchestrator, mutation bus)
//! - `routes/`: HTTP routes + handlers, and the route policy table
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses, including the auth error payload

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware::{self, AuthState};
use crate::pipeline::{AuthPipeline, PipelineError};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>, config: &ApiConfig) -> Result<Router, PipelineError> {
    let pipeline = AuthPipeline::standard(
        services.codec.clone(),
        services.sessions.clone(),
        services.permissions.clone(),
        config.io_timeout,
    )?;
    let auth_state = AuthState {
        pipeline: Arc::new(pipeline),
        policies: Arc::new(routes::policies(config.reports_organization)),
    };

    // Protected routes: the pipeline runs before every matched handler.
    let protected = routes::router().route_layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            )),
    );

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected))
}
