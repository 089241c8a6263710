//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use relaygate_auth::JwtValidator;
use relaygate_store::{TaskStore, UsageSink};

use crate::handlers::{health, metrics, tasks, usage};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check with circuit state
/// - `GET /metrics` - Per-endpoint request metrics
///
/// ## Tasks (authenticated)
/// - `POST /v1/ai/tasks` - Submit a task
/// - `GET /v1/ai/tasks` - List the caller's tasks
/// - `GET /v1/ai/tasks/:task_id` - Poll a task
///
/// ## Usage (authenticated)
/// - `GET /v1/ai/usage` - Quota and usage summary
pub fn create_router<S, V>(state: GatewayState<S, V>) -> Router
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Public
        .route("/health", get(health::health::<S, V>))
        .route("/metrics", get(metrics::metrics::<S, V>))
        // Tasks
        .route(
            "/v1/ai/tasks",
            get(tasks::list_tasks::<S, V>).post(tasks::submit_task::<S, V>),
        )
        .route("/v1/ai/tasks/:task_id", get(tasks::get_task::<S, V>))
        // Usage
        .route("/v1/ai/usage", get(usage::get_usage::<S, V>))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layers_build() {
        let _any = build_cors_layer(&["*".to_string()]);
        let _listed = build_cors_layer(&[
            "http://localhost:3000".to_string(),
            "not a url\n".to_string(),
        ]);
    }
}
