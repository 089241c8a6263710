//! API error types and responses.
//!
//! Every error response has the body `{"error": {"code", "message"}}`, where
//! `code` is the machine-readable error category.

use std::time::Duration;

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use relaygate_auth::AuthError;
use relaygate_control::ControlError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller does not own the resource.
    #[error("forbidden")]
    Forbidden,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid request body or parameters.
    #[error("{0}")]
    BadRequest(String),

    /// A tier quota is exhausted.
    #[error("{0}")]
    QuotaExceeded(String),

    /// Too many requests in the caller's window.
    #[error("{message}")]
    RateLimited {
        /// Description of the limit hit.
        message: String,
        /// Time until the next admission.
        retry_after: Duration,
    },

    /// The provider circuit is open.
    #[error("AI provider is temporarily unavailable")]
    CircuitOpen,

    /// The provider failed.
    #[error("{0}")]
    Provider(String),

    /// The provider returned unusable data.
    #[error("{0}")]
    InvalidResponse(String),

    /// The provider did not answer in time.
    #[error("{0}")]
    Timeout(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider(_) | Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "authentication_error",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "invalid_transition",
            Self::BadRequest(_) => "validation_error",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::CircuitOpen => "circuit_open",
            Self::Provider(_) => "provider_error",
            Self::InvalidResponse(_) => "invalid_response_error",
            Self::Timeout(_) => "timeout_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Whole seconds until retry, rounded up and never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let retry_after = match &self {
            Self::RateLimited { retry_after, .. } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::JwksFetchFailed(_) | AuthError::Internal(_) => {
                tracing::error!(error = %err, "Auth internal error");
                Self::Internal("authentication service error".to_string())
            }
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::RateLimitExceeded { retry_after, .. } => Self::RateLimited {
                message: err.to_string(),
                retry_after,
            },
            ControlError::CircuitOpen => Self::CircuitOpen,
            ControlError::QuotaExceeded { .. } => Self::QuotaExceeded(err.to_string()),
            ControlError::Validation(msg) => Self::BadRequest(msg),
            ControlError::Authentication(auth_err) => Self::from(auth_err),
            ControlError::Provider(msg) => Self::Provider(msg),
            ControlError::InvalidResponse(msg) => Self::InvalidResponse(msg),
            ControlError::Timeout(msg) => Self::Timeout(msg),
            ControlError::TaskNotFound(id) => Self::NotFound(format!("task {id}")),
            ControlError::NotOwner { .. } => Self::Forbidden,
            ControlError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            ControlError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            ControlError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::Internal(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_control::QuotaExceededReason;
    use relaygate_core::{OwnerId, TaskId};

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::QuotaExceeded("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::CircuitOpen.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Timeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn control_errors_keep_their_category() {
        let owner_id = OwnerId::generate();
        let task_id = TaskId::generate(&owner_id);

        let quota: ApiError = ControlError::QuotaExceeded {
            owner_id,
            reason: QuotaExceededReason::Daily { limit: 50 },
        }
        .into();
        assert_eq!(quota.code(), "quota_exceeded");

        let missing: ApiError = ControlError::TaskNotFound(task_id).into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let invalid: ApiError = ControlError::Validation("prompt is required".into()).into();
        assert_eq!(invalid.code(), "validation_error");
        assert_eq!(invalid.to_string(), "prompt is required");
    }

    #[test]
    fn auth_outage_is_internal() {
        let err: ApiError = AuthError::JwksFetchFailed("connection refused".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = AuthError::TokenExpired.into();
        assert_eq!(err.code(), "authentication_error");
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let err = ApiError::RateLimited {
            message: "slow down".into(),
            retry_after: Duration::from_millis(12_300),
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "13");
    }

    #[test]
    fn retry_after_is_never_zero() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
    }
}
