//! HTTP surface: router, handlers and request middleware.

pub mod handlers;
mod middleware;
mod state;

pub use middleware::RequestContext;
pub use state::ApiState;

use axum::{Router, middleware as axum_middleware, routing::get};

use middleware::{log_responses, set_request_context};

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/character/{id}", get(handlers::get_character))
        .route("/api/search", get(handlers::search_characters))
        .route("/health", get(handlers::health))
        .fallback(handlers::route_not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
