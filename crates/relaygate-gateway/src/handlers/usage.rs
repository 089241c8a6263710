//! Quota and usage endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use relaygate_auth::JwtValidator;
use relaygate_store::{TaskStore, UsageSink};

use crate::auth::BearerToken;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Quota counters, tier limits, and ledger totals for the caller.
///
/// # Example
///
/// ```text
/// GET /v1/ai/usage
///
/// Response: 200 OK
/// {
///   "owner_id": "550e8400-e29b-41d4-a716-446655440000",
///   "tier": "basic",
///   "limits": { "daily_requests": 200, "monthly_requests": 5000, ... },
///   "quota": { "daily": 3, "monthly": 41, "concurrent": 1 },
///   "usage": { "requests": 40, "total_tokens": 61250, "total_cost": "0.1325", ... }
/// }
/// ```
///
/// # Errors
///
/// Returns an error if the token is rejected or the store fails.
pub async fn get_usage<S, V>(
    State(state): State<Arc<GatewayState<S, V>>>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, ApiError>
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    let report = state.middleware.usage(&token).await?;
    Ok(Json(report))
}
