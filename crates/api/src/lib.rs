//! HTTP API: configuration, the authorization pipeline, and the axum wiring
//! that puts it in front of routes.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod policy;

pub use config::{ApiConfig, ConfigError};
pub use pipeline::{AuthContext, AuthPipeline, AuthStep, PipelineError};
pub use policy::{RoutePolicies, RoutePolicy};
