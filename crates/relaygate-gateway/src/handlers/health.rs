//! Health check endpoint.
//!
//! This module provides the public health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use relaygate_auth::JwtValidator;
use relaygate_control::{CircuitSnapshot, CircuitState};
use relaygate_store::{TaskStore, UsageSink};

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` while the provider circuit is open.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Provider circuit state.
    pub circuit: CircuitSnapshot,
}

impl HealthResponse {
    fn from_circuit(circuit: CircuitSnapshot) -> Self {
        let status = if circuit.state == CircuitState::Open {
            "degraded"
        } else {
            "healthy"
        };
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            circuit,
        }
    }
}

/// Health check handler.
///
/// Always answers 200. An open circuit is reported as `degraded`. This
/// endpoint is public.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "circuit": { "state": "closed", "consecutive_failures": 0, "last_failure_at": null }
/// }
/// ```
pub async fn health<S, V>(State(state): State<Arc<GatewayState<S, V>>>) -> impl IntoResponse
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    let response = HealthResponse::from_circuit(state.middleware.circuit());
    (StatusCode::OK, Json(response))
}
