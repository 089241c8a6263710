//! Task submission, dispatch, and polling.
//!
//! `submit` writes the task once, already in `processing`, and spawns the
//! provider call. The spawned dispatch owns the caller's
//! [`QuotaReservation`], so the concurrency slot is returned on every path
//! out of it: success, failure, ceiling timeout, or panic.
//!
//! Every provider call is made under a breaker [`Admission`], and its
//! outcome is recorded with that admission.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relaygate_core::{OwnerId, Priority, TaskId};
use relaygate_store::{ErrorCode, Task, TaskError, TaskKind, TaskStatus, TaskStore};
use serde_json::Value;
use tokio::time::Instant;

use crate::circuit::{Admission, CircuitBreaker};
use crate::config::{ControlConfig, RetryTable, TimeoutTable};
use crate::error::{ControlError, Result};
use crate::ledger::UsageLedger;
use crate::lifecycle;
use crate::provider::{ProviderAdapter, ProviderResponse};
use crate::quota::QuotaReservation;

#[derive(Default)]
struct Progress {
    attempts: AtomicU32,
    /// Admission of the provider call currently awaiting a reply.
    in_flight: Mutex<Option<Admission>>,
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Owns the task lifecycle from submission to its single terminal write.
pub struct TaskOrchestrator<S: TaskStore> {
    store: Arc<S>,
    provider: Arc<dyn ProviderAdapter>,
    circuit: Arc<CircuitBreaker>,
    ledger: Arc<UsageLedger>,
    retry: RetryTable,
    timeouts: TimeoutTable,
    terminal: Arc<Mutex<()>>,
}

impl<S: TaskStore> Clone for TaskOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            circuit: Arc::clone(&self.circuit),
            ledger: Arc::clone(&self.ledger),
            retry: self.retry,
            timeouts: self.timeouts,
            terminal: Arc::clone(&self.terminal),
        }
    }
}

impl<S: TaskStore + 'static> TaskOrchestrator<S> {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        provider: Arc<dyn ProviderAdapter>,
        circuit: Arc<CircuitBreaker>,
        ledger: Arc<UsageLedger>,
        config: &ControlConfig,
    ) -> Self {
        Self {
            store,
            provider,
            circuit,
            ledger,
            retry: config.retry,
            timeouts: config.timeouts,
            terminal: Arc::new(Mutex::new(())),
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a task, move it to `processing`, and dispatch it in the background.
    ///
    /// The task is built as `pending` and persisted once, after the move to
    /// `processing`, so a failed write leaves nothing behind. `admission` is
    /// the breaker decision the first provider call runs under.
    ///
    /// Returns the task as it is right after submission. The reservation is
    /// committed and then held by the dispatch until the task is terminal.
    ///
    /// # Errors
    ///
    /// Returns a store error if the task cannot be persisted, or
    /// `ControlError::Internal` if its deadline cannot be represented. The
    /// reservation is released uncommitted in both cases.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn submit(
        &self,
        owner_id: &OwnerId,
        kind: TaskKind,
        input: Value,
        priority: Priority,
        admission: Admission,
        mut reservation: QuotaReservation,
    ) -> Result<Task> {
        let now = Utc::now();
        let ceiling = self.timeouts.ceiling(priority);
        let deadline_at = chrono::Duration::from_std(ceiling)
            .ok()
            .and_then(|deadline| now.checked_add_signed(deadline))
            .ok_or_else(|| {
                ControlError::Internal(format!(
                    "deadline {}s past {now} is out of range",
                    ceiling.as_secs()
                ))
            })?;

        let mut task = Task {
            task_id: TaskId::generate(owner_id),
            owner_id: *owner_id,
            kind,
            priority,
            input,
            output: None,
            error: None,
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
            deadline_at,
        };
        task.status =
            lifecycle::validate_transition(&task.task_id, task.status, TaskStatus::Processing)?;
        self.store.put_task(&task)?;
        reservation.commit();

        tracing::info!(
            task_id = %task.task_id,
            owner_id = %owner_id,
            kind = %kind,
            priority = %priority,
            "Task submitted"
        );

        tokio::spawn(self.clone().dispatch(task.clone(), admission, reservation));
        Ok(task)
    }

    /// Current snapshot of a task. Never changes the task.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TaskNotFound` if the task doesn't exist.
    pub fn poll(&self, task_id: &TaskId) -> Result<Task> {
        self.store
            .get_task(task_id)?
            .ok_or(ControlError::TaskNotFound(*task_id))
    }

    /// Like [`poll`](Self::poll), verifying ownership.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TaskNotFound` if the task doesn't exist.
    /// Returns `ControlError::NotOwner` if the caller doesn't own it.
    pub fn poll_owned(&self, owner_id: &OwnerId, task_id: &TaskId) -> Result<Task> {
        let task = self.poll(task_id)?;
        if task.owner_id != *owner_id {
            return Err(ControlError::NotOwner {
                owner_id: *owner_id,
                task_id: *task_id,
            });
        }
        Ok(task)
    }

    /// All of an owner's tasks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the tasks cannot be listed.
    pub fn list_for_owner(&self, owner_id: &OwnerId) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks_by_owner(owner_id)?)
    }

    /// Fail every `pending` or `processing` task whose deadline is at or
    /// before `now`.
    ///
    /// Catches tasks whose dispatch did not survive a restart. Returns the
    /// number of tasks failed.
    ///
    /// # Errors
    ///
    /// Returns a store error if tasks cannot be listed.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut stale = self.store.list_tasks_by_status(TaskStatus::Pending)?;
        stale.extend(self.store.list_tasks_by_status(TaskStatus::Processing)?);
        stale.retain(|task| task.deadline_at <= now);

        let mut swept = 0;
        for task in stale {
            let error = TaskError {
                code: ErrorCode::TimeoutError,
                message: "task passed its deadline without a result".to_string(),
            };
            if self.finish(&task, Err(error), task.attempts) {
                self.ledger
                    .record_error(&task.owner_id, task.kind, ErrorCode::TimeoutError);
                swept += 1;
            }
        }

        if swept > 0 {
            tracing::warn!(swept, "Failed stale tasks");
        }
        Ok(swept)
    }

    async fn dispatch(self, task: Task, admission: Admission, reservation: QuotaReservation) {
        let ceiling = self.timeouts.ceiling(task.priority);
        let progress = Progress::default();

        let call = self.call_with_retry(&task, admission, &progress);
        let outcome = match tokio::time::timeout(ceiling, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if let Some(admission) = progress.in_flight.lock().take() {
                    self.circuit.record_failure(admission);
                }
                tracing::warn!(
                    task_id = %task.task_id,
                    ceiling_secs = ceiling.as_secs(),
                    "Task exceeded its processing ceiling"
                );
                Err(TaskError {
                    code: ErrorCode::TimeoutError,
                    message: format!("no result within {}s", ceiling.as_secs()),
                })
            }
        };
        let attempts = progress.attempts.load(Ordering::SeqCst);

        // The slot is free before the terminal status becomes visible.
        reservation.release();

        match outcome {
            Ok((response, response_time_ms)) => {
                if let Err(e) = self.ledger.record_for_task(
                    &task.owner_id,
                    &task.task_id,
                    task.kind,
                    response.prompt_tokens,
                    response.completion_tokens,
                    response_time_ms,
                ) {
                    tracing::error!(task_id = %task.task_id, error = %e, "Failed to record usage");
                }
                self.finish(&task, Ok(response.output), attempts);
            }
            Err(error) => {
                let code = error.code;
                if self.finish(&task, Err(error), attempts) {
                    self.ledger.record_error(&task.owner_id, task.kind, code);
                }
            }
        }
    }

    async fn call_with_retry(
        &self,
        task: &Task,
        mut admission: Admission,
        progress: &Progress,
    ) -> std::result::Result<(ProviderResponse, u64), TaskError> {
        let policy = *self.retry.policy(task.priority);
        let mut retry = 0;

        loop {
            if retry > 0 {
                admission = self.circuit.admit();
                if admission == Admission::Rejected {
                    tracing::warn!(task_id = %task.task_id, "Circuit open, abandoning retries");
                    return Err(TaskError {
                        code: ErrorCode::CircuitOpen,
                        message: "provider circuit opened before retry".to_string(),
                    });
                }
            }

            progress.attempts.fetch_add(1, Ordering::SeqCst);
            *progress.in_flight.lock() = Some(admission);
            let started = Instant::now();
            let result = self.provider.invoke(task.kind, &task.input).await;
            progress.in_flight.lock().take();

            match result {
                Ok(response) => {
                    self.circuit.record_success(admission);
                    return Ok((response, millis(started.elapsed())));
                }
                Err(err) => {
                    self.circuit.record_failure(admission);
                    if !err.is_transient() || retry >= policy.max_retries {
                        tracing::warn!(
                            task_id = %task.task_id,
                            attempts = retry + 1,
                            error = %err,
                            "Provider call failed"
                        );
                        return Err(ControlError::from(err).to_task_error());
                    }

                    let delay = policy.delay_for(retry);
                    tracing::warn!(
                        task_id = %task.task_id,
                        attempt = retry + 1,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }

    /// Write the terminal status. Returns false if the task was already
    /// terminal or the write failed.
    fn finish(
        &self,
        task: &Task,
        outcome: std::result::Result<Value, TaskError>,
        attempts: u32,
    ) -> bool {
        let _guard = self.terminal.lock();

        let current = match self.store.get_task(&task.task_id) {
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::error!(task_id = %task.task_id, "Task vanished before completion");
                return false;
            }
            Err(e) => {
                tracing::error!(task_id = %task.task_id, error = %e, "Failed to load task");
                return false;
            }
        };

        let target = if outcome.is_ok() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let mut updated = current;
        // A task written as pending never reached dispatch; walk it through processing.
        let path = [TaskStatus::Processing, target];
        let skip = usize::from(updated.status != TaskStatus::Pending);
        for &next in &path[skip..] {
            match lifecycle::validate_transition(&updated.task_id, updated.status, next) {
                Ok(status) => updated.status = status,
                Err(e) => {
                    tracing::warn!(task_id = %task.task_id, error = %e, "Dropping late terminal update");
                    return false;
                }
            }
        }

        updated.attempts = attempts;
        updated.updated_at = Utc::now();
        match outcome {
            Ok(output) => updated.output = Some(output),
            Err(error) => updated.error = Some(error),
        }

        match self.store.put_task(&updated) {
            Ok(()) => {
                tracing::info!(
                    task_id = %updated.task_id,
                    status = ?updated.status,
                    attempts,
                    "Task finished"
                );
                true
            }
            Err(e) => {
                tracing::error!(task_id = %updated.task_id, error = %e, "Failed to persist terminal status");
                false
            }
        }
    }
}
