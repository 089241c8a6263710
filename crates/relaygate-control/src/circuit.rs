//! Provider circuit breaker.
//!
//! ```text
//!   closed ──(failures >= threshold)──▶ open
//!     ▲                                  │ (reset timeout elapsed,
//!     │                                  │  checked on can_execute)
//!     │ probe ok                         ▼
//!     └──────────────────────────── half_open ──probe failed──▶ open
//! ```
//!
//! Outcomes are recorded with the [`Admission`] the call was made under.
//! Only the holder of the half-open probe can close or reopen the circuit;
//! a call admitted while closed that finishes during `half_open` only
//! touches the failure count.
//!
//! One breaker exists per provider for the life of the process.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow to the provider.
    Closed,
    /// Calls are rejected without reaching the provider.
    Open,
    /// One probe call is allowed through.
    HalfOpen,
}

/// Read-only view of the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Wall-clock time of the last failure.
    pub last_failure_at: Option<DateTime<Utc>>,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Outcome of asking the breaker for permission to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The circuit is closed.
    Allowed,
    /// The caller holds the single half-open probe.
    Probe,
    /// The circuit is open, or a probe is already out.
    Rejected,
}

/// Three-state breaker guarding the AI provider.
pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Whether a call may be made now.
    ///
    /// The only state change this performs is the lazy move from `open` to
    /// `half_open` once the reset timeout has elapsed. In `half_open` only the
    /// first caller gets `true` until the probe outcome is recorded.
    pub fn can_execute(&self) -> bool {
        self.admit() != Admission::Rejected
    }

    /// Like [`can_execute`](Self::can_execute), reporting whether the caller
    /// holds the half-open probe.
    pub fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout());
                if cooled {
                    tracing::info!("Circuit half-open, admitting probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Hand back a probe that was admitted but never sent.
    pub fn abandon_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight {
            tracing::debug!("Probe abandoned before dispatch");
            inner.probe_in_flight = false;
        }
    }

    /// Record a successful provider call made under `admission`.
    pub fn record_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        match (inner.state, admission) {
            (CircuitState::HalfOpen, Admission::Probe) => {
                tracing::info!("Circuit closed after successful probe");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.probe_in_flight = false;
            }
            (CircuitState::Closed, _) => inner.consecutive_failures = 0,
            // Admitted before the circuit opened. Only the probe may close it.
            (CircuitState::HalfOpen | CircuitState::Open, _) => {}
        }
    }

    /// Record a failed provider call made under `admission`.
    pub fn record_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match (inner.state, admission) {
            (CircuitState::Closed, _)
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                tracing::warn!(
                    failures = inner.consecutive_failures,
                    "Circuit opened"
                );
                inner.state = CircuitState::Open;
            }
            (CircuitState::HalfOpen, Admission::Probe) => {
                tracing::warn!("Probe failed, circuit reopened");
                inner.state = CircuitState::Open;
                inner.probe_in_flight = false;
            }
            _ => {}
        }
    }

    /// Returns true while the breaker is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().state == CircuitState::Open
    }

    /// Current state without triggering the lazy transition.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}
