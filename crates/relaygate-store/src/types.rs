//! Domain types stored by relaygate.
//!
//! These types represent the persisted state of AI tasks and usage records.

use chrono::{DateTime, Utc};
use relaygate_core::{OwnerId, Priority, TaskId, UsageId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An AI task record.
///
/// Created on submission, moved to `Processing` immediately, and written
/// exactly once more when it reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for the task.
    pub task_id: TaskId,
    /// Owner who submitted the task.
    pub owner_id: OwnerId,
    /// What the provider is asked to do.
    pub kind: TaskKind,
    /// Scheduling class used for retries and the timeout ceiling.
    pub priority: Priority,
    /// Structured request payload.
    pub input: serde_json::Value,
    /// Structured provider output, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Typed error summary, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Number of provider calls made so far.
    #[serde(default)]
    pub attempts: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Wall-clock deadline after which a processing task is forced to fail.
    pub deadline_at: DateTime<Utc>,
}

impl Task {
    /// Returns true once the task has reached `Completed` or `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The kind of AI work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Generate post content from a prompt.
    ContentGeneration,
    /// Score the sentiment of a piece of text.
    SentimentAnalysis,
    /// Suggest improvements for existing content.
    Optimization,
}

impl TaskKind {
    /// All task kinds.
    pub const ALL: [Self; 3] = [
        Self::ContentGeneration,
        Self::SentimentAnalysis,
        Self::Optimization,
    ];

    /// The snake-case wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentGeneration => "content_generation",
            Self::SentimentAnalysis => "sentiment_analysis",
            Self::Optimization => "optimization",
        }
    }

    /// Parse a wire name into a kind.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskStatus {
    /// Accepted but not yet dispatched.
    Pending = 1,
    /// Dispatched to the provider.
    Processing = 2,
    /// Provider returned a result.
    Completed = 3,
    /// Provider failed, timed out, or returned garbage.
    Failed = 4,
}

impl TaskStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `TaskStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Pending),
            2 => Some(Self::Processing),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Machine-readable error codes shared by the HTTP layer and stored task errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Caller exceeded its sliding-window rate limit.
    RateLimitExceeded,
    /// The provider circuit is open.
    CircuitOpen,
    /// Caller exceeded a tier quota.
    QuotaExceeded,
    /// The request was malformed.
    ValidationError,
    /// The caller could not be authenticated.
    AuthenticationError,
    /// The provider returned an error.
    ProviderError,
    /// The provider exceeded its deadline.
    TimeoutError,
    /// The provider returned structurally invalid data.
    InvalidResponseError,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    /// The snake-case wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::CircuitOpen => "circuit_open",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ValidationError => "validation_error",
            Self::AuthenticationError => "authentication_error",
            Self::ProviderError => "provider_error",
            Self::TimeoutError => "timeout_error",
            Self::InvalidResponseError => "invalid_response_error",
            Self::InternalError => "internal_error",
        }
    }
}

/// Error summary stored on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Error category.
    pub code: ErrorCode,
    /// Human-readable description of the last error.
    pub message: String,
}

/// One immutable entry in the usage ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique identifier for the record.
    pub usage_id: UsageId,
    /// Owner billed for the call.
    pub owner_id: OwnerId,
    /// Kind of work performed.
    pub kind: TaskKind,
    /// Task that produced the usage, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Tokens in the prompt.
    pub prompt_tokens: u64,
    /// Tokens in the completion.
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u64,
    /// Monetary cost, fixed-point.
    #[serde(with = "rust_decimal::serde::str")]
    pub cost: Decimal,
    /// Provider round-trip time in milliseconds.
    pub response_time_ms: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
