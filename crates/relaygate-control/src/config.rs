//! Static policy tables loaded once at startup.
//!
//! Every table has serde defaults so a partial JSON document only needs to
//! name the values it changes.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use relaygate_core::{Priority, Tier};
use relaygate_store::TaskKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for the control layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Sliding-window limits per endpoint class.
    pub rate_limits: RateLimitTable,
    /// Provider circuit breaker thresholds.
    pub circuit: CircuitConfig,
    /// Quota limits per tier.
    pub tiers: TierTable,
    /// Retry policy per priority.
    pub retry: RetryTable,
    /// Dispatch ceilings per priority.
    pub timeouts: TimeoutTable,
    /// Token prices.
    pub pricing: PricingTable,
}

// ============================================================================
// Rate limits
// ============================================================================

/// Admission cap `requests` over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum admissions inside the window.
    pub requests: u32,
    /// Window length in seconds.
    #[serde(default = "RateLimitPolicy::default_window_seconds")]
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    const fn default_window_seconds() -> u64 {
        60
    }

    /// Policy admitting `requests` per `window`.
    #[must_use]
    pub const fn new(requests: u32, window: Duration) -> Self {
        Self {
            requests,
            window_seconds: window.as_secs(),
        }
    }

    /// The window as a duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests: 100,
            window_seconds: Self::default_window_seconds(),
        }
    }
}

/// Default policy plus per-class overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitTable {
    /// Policy for classes without an override.
    pub default: RateLimitPolicy,
    /// Overrides keyed by endpoint class.
    pub overrides: HashMap<String, RateLimitPolicy>,
}

impl RateLimitTable {
    /// The policy for an endpoint class.
    #[must_use]
    pub fn policy_for(&self, class: &str) -> RateLimitPolicy {
        self.overrides.get(class).copied().unwrap_or(self.default)
    }
}

impl Default for RateLimitTable {
    fn default() -> Self {
        let overrides = HashMap::from([
            (
                TaskKind::ContentGeneration.as_str().to_string(),
                RateLimitPolicy::new(50, Duration::from_secs(60)),
            ),
            (
                TaskKind::SentimentAnalysis.as_str().to_string(),
                RateLimitPolicy::new(200, Duration::from_secs(60)),
            ),
        ]);
        Self {
            default: RateLimitPolicy::default(),
            overrides,
        }
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

/// Thresholds for the provider circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before admitting a probe.
    pub reset_timeout_seconds: u64,
}

impl CircuitConfig {
    /// The reset timeout as a duration.
    #[must_use]
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_seconds)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 60,
        }
    }
}

// ============================================================================
// Tiers
// ============================================================================

/// A count limit where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Limit(i64);

impl Limit {
    /// No limit.
    pub const UNLIMITED: Self = Self(-1);

    /// A finite limit.
    #[must_use]
    pub const fn at_most(value: i64) -> Self {
        Self(value)
    }

    /// Returns true for the unlimited sentinel.
    #[must_use]
    pub const fn is_unlimited(self) -> bool {
        self.0 < 0
    }

    /// The finite value, or `None` when unlimited.
    #[must_use]
    pub const fn value(self) -> Option<i64> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Returns true if `current` has already met or exceeded the limit.
    #[must_use]
    pub const fn is_reached_by(self, current: i64) -> bool {
        !self.is_unlimited() && current >= self.0
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("unlimited"),
        }
    }
}

/// Limits for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Admissions per 24 hours.
    pub daily_requests: Limit,
    /// Admissions per 30 days.
    pub monthly_requests: Limit,
    /// Tasks in flight at once.
    pub concurrent_requests: Limit,
    /// Largest `max_tokens` a request may ask for.
    pub max_tokens: Limit,
}

impl TierLimits {
    const fn finite(daily: i64, monthly: i64, concurrent: i64, max_tokens: i64) -> Self {
        Self {
            daily_requests: Limit::at_most(daily),
            monthly_requests: Limit::at_most(monthly),
            concurrent_requests: Limit::at_most(concurrent),
            max_tokens: Limit::at_most(max_tokens),
        }
    }

    /// Limits with every field unlimited.
    pub const UNLIMITED: Self = Self {
        daily_requests: Limit::UNLIMITED,
        monthly_requests: Limit::UNLIMITED,
        concurrent_requests: Limit::UNLIMITED,
        max_tokens: Limit::UNLIMITED,
    };
}

/// Limits for every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    /// Free tier.
    pub free: TierLimits,
    /// Basic tier.
    pub basic: TierLimits,
    /// Premium tier.
    pub premium: TierLimits,
    /// Enterprise tier.
    pub enterprise: TierLimits,
}

impl TierTable {
    /// Limits for a tier.
    #[must_use]
    pub const fn limits(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Basic => &self.basic,
            Tier::Premium => &self.premium,
            Tier::Enterprise => &self.enterprise,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            free: TierLimits::finite(50, 1000, 2, 1000),
            basic: TierLimits::finite(200, 5000, 5, 2000),
            premium: TierLimits::finite(1000, 25000, 10, 4000),
            enterprise: TierLimits::UNLIMITED,
        }
    }
}

// ============================================================================
// Retry and timeouts
// ============================================================================

/// How the delay grows between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed,
    /// The delay doubles after every retry.
    Exponential,
}

/// Retry policy applied at the provider call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_seconds: u64,
    /// Growth of the delay.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// A policy with the same delay before every retry.
    #[must_use]
    pub const fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_seconds: delay.as_secs(),
            backoff: Backoff::Fixed,
        }
    }

    /// A policy whose delay doubles from `base`.
    #[must_use]
    pub const fn exponential(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            base_delay_seconds: base.as_secs(),
            backoff: Backoff::Exponential,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = Duration::from_secs(self.base_delay_seconds);
        match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => base.saturating_mul(2_u32.saturating_pow(retry)),
        }
    }
}

/// Retry policy per priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryTable {
    /// Low priority.
    pub low: RetryPolicy,
    /// Normal priority.
    pub normal: RetryPolicy,
    /// High priority.
    pub high: RetryPolicy,
}

impl RetryTable {
    /// Policy for a priority.
    #[must_use]
    pub const fn policy(&self, priority: Priority) -> &RetryPolicy {
        match priority {
            Priority::Low => &self.low,
            Priority::Normal => &self.normal,
            Priority::High => &self.high,
        }
    }
}

impl Default for RetryTable {
    fn default() -> Self {
        Self {
            low: RetryPolicy::fixed(3, Duration::from_secs(60)),
            normal: RetryPolicy::fixed(3, Duration::from_secs(60)),
            high: RetryPolicy::exponential(5, Duration::from_secs(30)),
        }
    }
}

/// Ceiling on how long a task may stay in `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutTable {
    /// Low priority ceiling in seconds.
    pub low_seconds: u64,
    /// Normal priority ceiling in seconds.
    pub normal_seconds: u64,
    /// High priority ceiling in seconds.
    pub high_seconds: u64,
}

impl TimeoutTable {
    /// Ceiling for a priority.
    #[must_use]
    pub const fn ceiling(&self, priority: Priority) -> Duration {
        Duration::from_secs(match priority {
            Priority::Low => self.low_seconds,
            Priority::Normal => self.normal_seconds,
            Priority::High => self.high_seconds,
        })
    }
}

impl Default for TimeoutTable {
    fn default() -> Self {
        Self {
            low_seconds: 600,
            normal_seconds: 300,
            high_seconds: 180,
        }
    }
}

// ============================================================================
// Pricing
// ============================================================================

/// Prices per thousand tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Price per 1000 prompt tokens.
    pub prompt_per_1k: Decimal,
    /// Price per 1000 completion tokens.
    pub completion_per_1k: Decimal,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            prompt_per_1k: Decimal::new(2, 3),
            completion_per_1k: Decimal::new(4, 3),
        }
    }
}

/// Default prices plus per-kind overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingTable {
    /// Prices for kinds without an override.
    pub default: Pricing,
    /// Per-kind overrides.
    pub overrides: HashMap<TaskKind, Pricing>,
}

impl PricingTable {
    /// Prices for a task kind.
    #[must_use]
    pub fn pricing_for(&self, kind: TaskKind) -> Pricing {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}
