//! Task lifecycle state machine.
//!
//! ```text
//!   pending ──submit──▶ processing ──success──▶ completed
//!                            │
//!                            └──────failure───▶ failed
//! ```
//!
//! There are no other edges. Terminal states never change.

use relaygate_core::TaskId;
use relaygate_store::TaskStatus;

use crate::error::{ControlError, Result};

/// Validates a transition and returns the target status if it is allowed.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the edge does not exist.
pub fn validate_transition(task_id: &TaskId, from: TaskStatus, to: TaskStatus) -> Result<TaskStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition {
            task_id: *task_id,
            from,
            to,
        })
    }
}

/// Check if a transition is an edge of the lifecycle.
#[must_use]
pub const fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::{Completed, Failed, Pending, Processing};

    matches!(
        (from, to),
        (Pending, Processing) | (Processing, Completed | Failed)
    )
}

/// Returns the statuses reachable in one step from `status`.
#[must_use]
pub fn valid_transitions_from(status: TaskStatus) -> Vec<TaskStatus> {
    use TaskStatus::{Completed, Failed, Pending, Processing};

    match status {
        Pending => vec![Processing],
        Processing => vec![Completed, Failed],
        Completed | Failed => vec![],
    }
}
