//! The admission facade every request goes through.
//!
//! [`GatewayMiddleware::admit`] runs the stages in a fixed order:
//!
//! 1. authenticate the bearer token
//! 2. parse the body, validate the payload and requested token ceiling
//! 3. reserve quota
//! 4. check the provider circuit
//! 5. take a rate-limit slot
//! 6. submit to the orchestrator
//!
//! A rejection at any stage after quota drops the uncommitted reservation,
//! which returns the concurrency slot and refunds the daily and monthly
//! counts. Only a submitted task spends quota.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use relaygate_auth::JwtValidator;
use relaygate_control::{
    payload, Admission, CircuitBreaker, CircuitSnapshot, ControlConfig, ControlError,
    ProviderAdapter, QuotaEnforcer, QuotaUsage, RateLimiter, Result, TaskOrchestrator, TierLimits,
    UsageLedger, UsageSummary,
};
use relaygate_core::{OwnerId, Priority, TaskId, Tier};
use relaygate_store::{CounterStore, Task, TaskKind, TaskStatus, TaskStore, UsageSink};

use crate::auth::AuthPrincipal;
use crate::metrics::GatewayMetrics;

/// A request for AI work.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    /// What to do.
    pub kind: TaskKind,
    /// Kind-specific input.
    pub payload: Value,
    /// Scheduling class, `normal` when omitted.
    #[serde(default)]
    pub priority: Priority,
}

/// An accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Handle for polling.
    pub task_id: TaskId,
    /// Status right after admission.
    pub status: TaskStatus,
}

/// Quota and billing view for one owner.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    /// The owner.
    pub owner_id: OwnerId,
    /// Tier from the caller's token.
    pub tier: Tier,
    /// Limits of that tier.
    pub limits: TierLimits,
    /// Current counter values.
    pub quota: QuotaUsage,
    /// Ledger totals.
    pub usage: UsageSummary,
}

/// Everything the gateway needs to admit, track, and account for requests.
pub struct GatewayMiddleware<S, V>
where
    S: TaskStore + UsageSink,
    V: JwtValidator,
{
    validator: Arc<V>,
    quota: QuotaEnforcer,
    circuit: Arc<CircuitBreaker>,
    rate_limiter: RateLimiter,
    orchestrator: TaskOrchestrator<S>,
    ledger: Arc<UsageLedger>,
    metrics: GatewayMetrics,
    slow_request_threshold: Duration,
}

impl<S, V> GatewayMiddleware<S, V>
where
    S: TaskStore + UsageSink + 'static,
    V: JwtValidator,
{
    /// Wire the middleware over a store, a counter backend, and a provider
    /// guarded by `circuit`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        counters: Arc<dyn CounterStore>,
        provider: Arc<dyn ProviderAdapter>,
        circuit: Arc<CircuitBreaker>,
        validator: Arc<V>,
        config: &ControlConfig,
        slow_request_threshold: Duration,
    ) -> Self {
        let sink: Arc<dyn UsageSink> = store.clone();
        let ledger = Arc::new(UsageLedger::new(sink, config.pricing.clone()));
        let orchestrator = TaskOrchestrator::new(
            store,
            provider,
            Arc::clone(&circuit),
            Arc::clone(&ledger),
            config,
        );

        Self {
            validator,
            quota: QuotaEnforcer::new(counters, config.tiers),
            circuit,
            rate_limiter: RateLimiter::new(config.rate_limits.clone()),
            orchestrator,
            ledger,
            metrics: GatewayMetrics::new(),
            slow_request_threshold,
        }
    }

    /// Request metrics.
    #[must_use]
    pub const fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Current provider circuit state.
    #[must_use]
    pub fn circuit(&self) -> CircuitSnapshot {
        self.circuit.snapshot()
    }

    /// Validate a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Authentication` if the token is rejected.
    pub async fn authenticate(&self, bearer: &str) -> Result<AuthPrincipal> {
        let claims = self.validator.validate(bearer).await.map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            ControlError::from(e)
        })?;
        Ok(AuthPrincipal::from_claims(&claims))
    }

    /// Admit a request and start its task.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that rejects the request.
    pub async fn admit(&self, bearer: &str, request: GenerationRequest) -> Result<Admitted> {
        let started = Instant::now();
        let result = async {
            let principal = self.authenticate(bearer).await?;
            self.run_admission(&principal, request)
        }
        .await;
        self.observe("admit", started, result.is_err());
        result
    }

    /// Like [`admit`](Self::admit) for a raw JSON body.
    ///
    /// The token is checked before the body is parsed, so an unauthenticated
    /// caller learns nothing about the request format.
    ///
    /// # Errors
    ///
    /// Returns an authentication error, `ControlError::Validation` for a body
    /// that is not a [`GenerationRequest`], or the error of the first later
    /// stage that rejects the request.
    pub async fn admit_json(&self, bearer: &str, body: &[u8]) -> Result<Admitted> {
        let started = Instant::now();
        let result = async {
            let principal = self.authenticate(bearer).await?;
            let request: GenerationRequest = serde_json::from_slice(body)
                .map_err(|e| ControlError::Validation(format!("invalid request body: {e}")))?;
            self.run_admission(&principal, request)
        }
        .await;
        self.observe("admit", started, result.is_err());
        result
    }

    fn run_admission(
        &self,
        principal: &AuthPrincipal,
        request: GenerationRequest,
    ) -> Result<Admitted> {
        let owner_id = principal.owner_id;

        payload::validate(request.kind, &request.payload)?;
        if let Some(requested) = payload::requested_max_tokens(&request.payload) {
            self.quota.check_tokens(principal.tier, requested)?;
        }

        let reservation = self.quota.check_and_reserve(&owner_id, principal.tier)?;

        let admission = self.circuit.admit();
        if admission == Admission::Rejected {
            tracing::warn!(owner_id = %owner_id, kind = %request.kind, "Circuit open, shedding request");
            return Err(ControlError::CircuitOpen);
        }

        let class = request.kind.as_str();
        if !self.rate_limiter.acquire_for(owner_id, class) {
            if admission == Admission::Probe {
                self.circuit.abandon_probe();
            }
            let key = RateLimiter::key_for(owner_id, class);
            let retry_after = self
                .rate_limiter
                .retry_after(&key)
                .unwrap_or(Duration::from_secs(1));
            return Err(ControlError::RateLimitExceeded { key, retry_after });
        }

        let task = self
            .orchestrator
            .submit(
                &owner_id,
                request.kind,
                request.payload,
                request.priority,
                admission,
                reservation,
            )
            .inspect_err(|_| {
                if admission == Admission::Probe {
                    self.circuit.abandon_probe();
                }
            })?;

        Ok(Admitted {
            task_id: task.task_id,
            status: task.status,
        })
    }

    /// Current snapshot of one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns an authentication error, `TaskNotFound`, or `NotOwner`.
    pub async fn poll(&self, bearer: &str, task_id: &TaskId) -> Result<Task> {
        let started = Instant::now();
        let result = async {
            let principal = self.authenticate(bearer).await?;
            self.orchestrator.poll_owned(&principal.owner_id, task_id)
        }
        .await;
        self.observe("poll", started, result.is_err());
        result
    }

    /// All of the caller's tasks, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an authentication or store error.
    pub async fn list(&self, bearer: &str) -> Result<Vec<Task>> {
        let started = Instant::now();
        let result = async {
            let principal = self.authenticate(bearer).await?;
            self.orchestrator.list_for_owner(&principal.owner_id)
        }
        .await;
        self.observe("list", started, result.is_err());
        result
    }

    /// Quota counters and ledger totals for the caller.
    ///
    /// # Errors
    ///
    /// Returns an authentication or store error.
    pub async fn usage(&self, bearer: &str) -> Result<UsageReport> {
        let started = Instant::now();
        let result = async {
            let principal = self.authenticate(bearer).await?;
            Ok(UsageReport {
                owner_id: principal.owner_id,
                tier: principal.tier,
                limits: *self.quota.tiers().limits(principal.tier),
                quota: self.quota.usage(&principal.owner_id)?,
                usage: self.ledger.summary(&principal.owner_id)?,
            })
        }
        .await;
        self.observe("usage", started, result.is_err());
        result
    }

    /// Periodic upkeep: fail stale tasks and drop idle rate windows.
    ///
    /// Returns the number of tasks failed.
    ///
    /// # Errors
    ///
    /// Returns a store error if processing tasks cannot be listed.
    pub fn maintain(&self) -> Result<usize> {
        let swept = self.orchestrator.sweep_stale(Utc::now())?;
        let purged = self.rate_limiter.purge_idle();
        tracing::debug!(swept, purged, "Maintenance pass finished");
        Ok(swept)
    }

    fn observe(&self, endpoint: &'static str, started: Instant, is_error: bool) {
        let elapsed = started.elapsed();
        self.metrics.record(endpoint, elapsed, is_error);
        if elapsed > self.slow_request_threshold {
            tracing::warn!(
                endpoint,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "Slow request"
            );
        }
    }
}
