//! Cost computation and the usage ledger.
//!
//! Cost is `prompt/1000 * prompt_price + completion/1000 * completion_price`
//! in fixed-point decimal, rounded to 10 significant digits and normalized,
//! so the same inputs always produce the same decimal string.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use relaygate_core::{OwnerId, TaskId, UsageId};
use relaygate_store::{ErrorCode, TaskKind, UsageRecord, UsageSink};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{Pricing, PricingTable};
use crate::error::Result;

const SIGNIFICANT_DIGITS: u32 = 10;

/// Compute the cost of a call.
#[must_use]
pub fn cost_for(pricing: &Pricing, prompt_tokens: u64, completion_tokens: u64) -> Decimal {
    let per_token =
        |tokens: u64, price: Decimal| Decimal::from(tokens) / Decimal::ONE_THOUSAND * price;
    let cost = per_token(prompt_tokens, pricing.prompt_per_1k)
        + per_token(completion_tokens, pricing.completion_per_1k);
    cost.round_sf(SIGNIFICANT_DIGITS).unwrap_or(cost).normalize()
}

/// Aggregate of an owner's ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    /// Number of billed calls.
    pub requests: u64,
    /// Prompt tokens across all calls.
    pub prompt_tokens: u64,
    /// Completion tokens across all calls.
    pub completion_tokens: u64,
    /// Total tokens across all calls.
    pub total_tokens: u64,
    /// Total cost.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_cost: Decimal,
}

/// Prices calls and appends them to the usage sink.
pub struct UsageLedger {
    sink: Arc<dyn UsageSink>,
    pricing: PricingTable,
    errors: Mutex<BTreeMap<ErrorCode, u64>>,
}

impl UsageLedger {
    /// Create a ledger writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn UsageSink>, pricing: PricingTable) -> Self {
        Self {
            sink,
            pricing,
            errors: Mutex::new(BTreeMap::new()),
        }
    }

    /// The pricing table in force.
    #[must_use]
    pub const fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Price a call and append it to the ledger.
    ///
    /// # Errors
    ///
    /// Returns a store error if the record cannot be appended.
    pub fn record(
        &self,
        owner_id: &OwnerId,
        kind: TaskKind,
        prompt_tokens: u64,
        completion_tokens: u64,
        response_time_ms: u64,
    ) -> Result<UsageRecord> {
        self.append(owner_id, kind, None, prompt_tokens, completion_tokens, response_time_ms)
    }

    /// Like [`record`](Self::record), linking the entry to its task.
    ///
    /// # Errors
    ///
    /// Returns a store error if the record cannot be appended.
    pub fn record_for_task(
        &self,
        owner_id: &OwnerId,
        task_id: &TaskId,
        kind: TaskKind,
        prompt_tokens: u64,
        completion_tokens: u64,
        response_time_ms: u64,
    ) -> Result<UsageRecord> {
        self.append(
            owner_id,
            kind,
            Some(*task_id),
            prompt_tokens,
            completion_tokens,
            response_time_ms,
        )
    }

    fn append(
        &self,
        owner_id: &OwnerId,
        kind: TaskKind,
        task_id: Option<TaskId>,
        prompt_tokens: u64,
        completion_tokens: u64,
        response_time_ms: u64,
    ) -> Result<UsageRecord> {
        let cost = cost_for(&self.pricing.pricing_for(kind), prompt_tokens, completion_tokens);
        let record = UsageRecord {
            usage_id: UsageId::generate(),
            owner_id: *owner_id,
            kind,
            task_id,
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            cost,
            response_time_ms,
            created_at: Utc::now(),
        };

        self.sink.append(&record)?;
        tracing::info!(
            owner_id = %owner_id,
            kind = %kind,
            total_tokens = record.total_tokens,
            cost = %record.cost,
            "Recorded usage"
        );
        Ok(record)
    }

    /// Count a failed call that carries no cost.
    pub fn record_error(&self, owner_id: &OwnerId, kind: TaskKind, code: ErrorCode) {
        *self.errors.lock().entry(code).or_insert(0) += 1;
        tracing::warn!(owner_id = %owner_id, kind = %kind, code = code.as_str(), "AI call failed");
    }

    /// Failed calls seen so far, by code.
    #[must_use]
    pub fn error_counts(&self) -> BTreeMap<ErrorCode, u64> {
        self.errors.lock().clone()
    }

    /// Totals over an owner's ledger entries.
    ///
    /// # Errors
    ///
    /// Returns a store error if the ledger cannot be read.
    pub fn summary(&self, owner_id: &OwnerId) -> Result<UsageSummary> {
        let records = self.sink.list_usage_by_owner(owner_id)?;
        Ok(records.iter().fold(
            UsageSummary {
                requests: 0,
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
                total_cost: Decimal::ZERO,
            },
            |mut acc, r| {
                acc.requests += 1;
                acc.prompt_tokens += r.prompt_tokens;
                acc.completion_tokens += r.completion_tokens;
                acc.total_tokens += r.total_tokens;
                acc.total_cost += r.cost;
                acc
            },
        ))
    }
}
