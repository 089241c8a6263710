//! AI task endpoints.
//!
//! Submission returns `202 Accepted` with a task handle. Callers poll the
//! handle until the task is `completed` or `failed`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use relaygate_auth::JwtValidator;
use relaygate_core::{Priority, TaskId};
use relaygate_store::{Task, TaskError, TaskKind, TaskStatus, TaskStore, UsageSink};

use crate::auth::BearerToken;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Task ID to poll.
    pub task_id: String,
    /// Status right after admission.
    pub status: TaskStatus,
}

/// Response for a single task.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    /// Task ID.
    pub task_id: String,
    /// Kind of work.
    pub kind: TaskKind,
    /// Scheduling class.
    pub priority: Priority,
    /// Current status.
    pub status: TaskStatus,
    /// Provider output, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error summary, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Provider calls made.
    pub attempts: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id.to_hex(),
            kind: task.kind,
            priority: task.priority,
            status: task.status,
            result: task.output,
            error: task.error,
            attempts: task.attempts,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Response for task list.
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    /// The caller's tasks, oldest first.
    pub tasks: Vec<TaskResponse>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Submit an AI task.
///
/// The body is parsed only after the token is accepted.
///
/// # Errors
///
/// Returns the error of the first admission stage that rejects the request.
pub async fn submit_task<S, V>(
    State(state): State<Arc<GatewayState<S, V>>>,
    BearerToken(token): BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    let admitted = state.middleware.admit_json(&token, &body).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: admitted.task_id.to_hex(),
            status: admitted.status,
        }),
    ))
}

/// Get a single task by ID.
///
/// # Errors
///
/// Returns an error if the task is not found or the caller doesn't own it.
pub async fn get_task<S, V>(
    State(state): State<Arc<GatewayState<S, V>>>,
    BearerToken(token): BearerToken,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    let task_id = parse_task_id(&task_id)?;
    let task = state.middleware.poll(&token, &task_id).await?;

    Ok(Json(TaskResponse::from(task)))
}

/// List the caller's tasks.
///
/// # Errors
///
/// Returns an error if the token is rejected or the store fails.
pub async fn list_tasks<S, V>(
    State(state): State<Arc<GatewayState<S, V>>>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, ApiError>
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator + 'static,
{
    let tasks = state.middleware.list(&token).await?;

    Ok(Json(ListTasksResponse {
        tasks: tasks.into_iter().map(TaskResponse::from).collect(),
    }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a task ID from a string.
fn parse_task_id(s: &str) -> Result<TaskId, ApiError> {
    TaskId::from_hex(s).map_err(|_| ApiError::BadRequest(format!("invalid task ID: {s}")))
}
