//! Metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use relaygate_auth::JwtValidator;
use relaygate_store::{TaskStore, UsageSink};

use crate::state::GatewayState;

/// Per-endpoint request counters as JSON.
pub async fn metrics<S, V>(State(state): State<Arc<GatewayState<S, V>>>) -> impl IntoResponse
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    Json(state.middleware.metrics().snapshot())
}
