//! Admission control and task orchestration for relaygate.
//!
//! Every request passes through the same admission chain before any provider
//! call is made, then runs as a background task whose status callers poll.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌──────────┐  │
//! │  │  Payload   │ │   Quota    │ │  Circuit   │ │   Rate   │  │
//! │  │ validation │ │  enforcer  │ │  breaker   │ │  limiter │  │
//! │  └────────────┘ └────────────┘ └────────────┘ └──────────┘  │
//! │                    TaskOrchestrator                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Ledger  │   │ Provider │
//!        │ (RocksDB)│   │ (usage)  │   │  (HTTP)  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use relaygate_control::{
//!     Admission, CircuitBreaker, ControlConfig, HttpProviderAdapter, ProviderConfig,
//!     QuotaEnforcer, TaskOrchestrator, UsageLedger,
//! };
//! use relaygate_core::{OwnerId, Priority, Tier};
//! use relaygate_store::{MemoryCounterStore, RocksStore, TaskKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControlConfig::default();
//! let store = Arc::new(RocksStore::open("/tmp/relaygate")?);
//! let provider = Arc::new(HttpProviderAdapter::new(ProviderConfig::default())?);
//! let circuit = Arc::new(CircuitBreaker::new(config.circuit));
//! let ledger = Arc::new(UsageLedger::new(store.clone(), config.pricing.clone()));
//! let quota = QuotaEnforcer::new(Arc::new(MemoryCounterStore::new()), config.tiers);
//!
//! let orchestrator =
//!     TaskOrchestrator::new(store, provider, Arc::clone(&circuit), ledger, &config);
//!
//! let owner = OwnerId::generate();
//! let reservation = quota.check_and_reserve(&owner, Tier::Basic)?;
//! let admission = circuit.admit();
//! assert_ne!(admission, Admission::Rejected);
//! let task = orchestrator.submit(
//!     &owner,
//!     TaskKind::ContentGeneration,
//!     serde_json::json!({ "prompt": "Write a launch post" }),
//!     Priority::Normal,
//!     admission,
//!     reservation,
//! )?;
//! println!("submitted {}", task.task_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Task lifecycle
//!
//! - `Pending` → `Processing` on submission, persisted as one write
//! - `Processing` → `Completed` or `Failed`, written exactly once
//! - `Pending` or `Processing` past its deadline → `Failed` by `sweep_stale`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod circuit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod orchestrator;
pub mod payload;
pub mod provider;
pub mod quota;
pub mod rate_limit;

pub use circuit::{Admission, CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::{
    Backoff, CircuitConfig, ControlConfig, Limit, Pricing, PricingTable, RateLimitPolicy,
    RateLimitTable, RetryPolicy, RetryTable, TierLimits, TierTable, TimeoutTable,
};
pub use error::{ControlError, Result};
pub use ledger::{cost_for, UsageLedger, UsageSummary};
pub use orchestrator::TaskOrchestrator;
pub use provider::{
    HttpProviderAdapter, ProviderAdapter, ProviderConfig, ProviderError, ProviderResponse,
};
#[cfg(any(test, feature = "test-utils"))]
pub use provider::ScriptedProvider;
pub use quota::{QuotaEnforcer, QuotaExceededReason, QuotaReservation, QuotaUsage};
pub use rate_limit::RateLimiter;
