//! Error types for admission control and task orchestration.
//!
//! Each variant maps to one HTTP status so the gateway can translate errors
//! without inspecting messages.

use std::time::Duration;

use relaygate_core::{OwnerId, TaskId};
use relaygate_store::{ErrorCode, TaskError, TaskStatus};
use thiserror::Error;

use crate::provider::ProviderError;
use crate::quota::QuotaExceededReason;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur while admitting or running AI tasks.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The caller's sliding window is full.
    #[error("rate limit exceeded for {key}, retry in {}s", .retry_after.as_secs())]
    RateLimitExceeded {
        /// Rate-limit key that was checked.
        key: String,
        /// Time until the oldest admission leaves the window.
        retry_after: Duration,
    },

    /// The provider circuit is open and calls are being shed.
    #[error("AI provider is unavailable, circuit open")]
    CircuitOpen,

    /// The owner hit a tier limit.
    #[error("quota exceeded for owner {owner_id}: {reason}")]
    QuotaExceeded {
        /// Owner whose quota is exhausted.
        owner_id: OwnerId,
        /// Which limit was hit.
        reason: QuotaExceededReason,
    },

    /// The request is malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The bearer token was rejected.
    #[error("authentication error: {0}")]
    Authentication(#[from] relaygate_auth::AuthError),

    /// The provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider did not answer before the deadline.
    #[error("provider timed out: {0}")]
    Timeout(String),

    /// The provider answered with structurally invalid data.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The requested task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The caller does not own the task.
    #[error("owner {owner_id} does not own task {task_id}")]
    NotOwner {
        /// The caller.
        owner_id: OwnerId,
        /// The task being accessed.
        task_id: TaskId,
    },

    /// A task status change would break the lifecycle.
    #[error("invalid transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Task being transitioned.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] relaygate_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::RateLimitExceeded { .. } => 429,
            Self::CircuitOpen => 503,
            Self::QuotaExceeded { .. } => 402,
            Self::Validation(_) => 400,
            Self::Authentication(_) => 401,
            Self::Provider(_) | Self::InvalidResponse(_) => 502,
            Self::Timeout(_) => 504,
            Self::TaskNotFound(_) => 404,
            Self::NotOwner { .. } => 403,
            Self::InvalidTransition { .. } => 409,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if the caller may succeed by sending the same request later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. }
                | Self::CircuitOpen
                | Self::Timeout(_)
                | Self::Store(_)
                | Self::Internal(_)
        )
    }

    /// Machine-readable code for the error body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded.as_str(),
            Self::CircuitOpen => ErrorCode::CircuitOpen.as_str(),
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded.as_str(),
            Self::Validation(_) => ErrorCode::ValidationError.as_str(),
            Self::Authentication(_) => ErrorCode::AuthenticationError.as_str(),
            Self::Provider(_) => ErrorCode::ProviderError.as_str(),
            Self::Timeout(_) => ErrorCode::TimeoutError.as_str(),
            Self::InvalidResponse(_) => ErrorCode::InvalidResponseError.as_str(),
            Self::TaskNotFound(_) => "not_found",
            Self::NotOwner { .. } => "forbidden",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Store(_) | Self::Internal(_) => ErrorCode::InternalError.as_str(),
        }
    }

    /// The error recorded on a task that this error ended.
    #[must_use]
    pub fn to_task_error(&self) -> TaskError {
        let code = match self {
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            Self::CircuitOpen => ErrorCode::CircuitOpen,
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Authentication(_) => ErrorCode::AuthenticationError,
            Self::Provider(_) => ErrorCode::ProviderError,
            Self::Timeout(_) => ErrorCode::TimeoutError,
            Self::InvalidResponse(_) => ErrorCode::InvalidResponseError,
            Self::TaskNotFound(_)
            | Self::NotOwner { .. }
            | Self::InvalidTransition { .. }
            | Self::Store(_)
            | Self::Internal(_) => ErrorCode::InternalError,
        };
        TaskError {
            code,
            message: self.to_string(),
        }
    }
}

impl From<ProviderError> for ControlError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(_) => Self::Timeout(err.to_string()),
            ProviderError::InvalidResponse(_) => Self::InvalidResponse(err.to_string()),
            ProviderError::Upstream { .. } | ProviderError::Unavailable(_) => {
                Self::Provider(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        let owner_id = OwnerId::generate();
        let task_id = TaskId::generate(&owner_id);

        assert_eq!(
            ControlError::RateLimitExceeded {
                key: "k".into(),
                retry_after: Duration::from_secs(3)
            }
            .http_status_code(),
            429
        );
        assert_eq!(ControlError::CircuitOpen.http_status_code(), 503);
        assert_eq!(
            ControlError::QuotaExceeded {
                owner_id,
                reason: QuotaExceededReason::Daily { limit: 50 }
            }
            .http_status_code(),
            402
        );
        assert_eq!(ControlError::Validation("x".into()).http_status_code(), 400);
        assert_eq!(ControlError::Provider("x".into()).http_status_code(), 502);
        assert_eq!(ControlError::Timeout("x".into()).http_status_code(), 504);
        assert_eq!(
            ControlError::InvalidResponse("x".into()).http_status_code(),
            502
        );
        assert_eq!(ControlError::TaskNotFound(task_id).http_status_code(), 404);
        assert_eq!(
            ControlError::NotOwner { owner_id, task_id }.http_status_code(),
            403
        );
        assert_eq!(
            ControlError::InvalidTransition {
                task_id,
                from: TaskStatus::Completed,
                to: TaskStatus::Processing
            }
            .http_status_code(),
            409
        );
    }

    #[test]
    fn admission_errors_carry_wire_codes() {
        assert_eq!(ControlError::CircuitOpen.code(), "circuit_open");
        assert_eq!(
            ControlError::Validation("x".into()).code(),
            "validation_error"
        );
        assert_eq!(
            ControlError::Authentication(relaygate_auth::AuthError::TokenExpired).code(),
            "authentication_error"
        );
    }

    #[test]
    fn provider_errors_map_by_kind() {
        let timeout: ControlError = ProviderError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(timeout.http_status_code(), 504);

        let invalid: ControlError = ProviderError::InvalidResponse("no choices".into()).into();
        assert_eq!(invalid.http_status_code(), 502);
        assert_eq!(invalid.code(), "invalid_response_error");

        let upstream: ControlError = ProviderError::Upstream {
            status: 500,
            message: "boom".into(),
            retryable: true,
        }
        .into();
        assert_eq!(upstream.code(), "provider_error");
    }

    #[test]
    fn provider_errors_become_task_errors() {
        let unavailable = ControlError::from(ProviderError::Unavailable("refused".into()));
        let error = unavailable.to_task_error();
        assert_eq!(error.code, ErrorCode::ProviderError);
        assert!(error.message.contains("refused"));

        let timeout = ControlError::from(ProviderError::Timeout(Duration::from_secs(5)));
        assert_eq!(timeout.to_task_error().code, ErrorCode::TimeoutError);

        let invalid = ControlError::from(ProviderError::InvalidResponse("no choices".into()));
        assert_eq!(invalid.to_task_error().code, ErrorCode::InvalidResponseError);
        assert_eq!(invalid.to_task_error().code.as_str(), invalid.code());
    }
}
