pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};

use axum::{Router, middleware as axum_middleware};

use crate::infra::bootstrap::AppServices;

use self::middleware::{log_responses, set_request_context};

/// The full HTTP surface with request ids and response logging applied.
pub fn build_router(services: AppServices) -> Router {
    build_api_router(ApiState::new(services))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
