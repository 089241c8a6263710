//! Tier quota enforcement.
//!
//! Three counters per owner live in the [`CounterStore`]:
//!
//! - `quota:<owner>:daily` expires 24 hours after its first increment
//! - `quota:<owner>:monthly` expires 30 days after its first increment
//! - `quota:<owner>:concurrent` has no TTL and is decremented on release
//!
//! A reservation counts against the daily and monthly windows only once it
//! is committed. Releasing an uncommitted reservation rolls those counters
//! back, so an admission rejected after the quota stage costs nothing.
//!
//! The read, check, and increments for one owner happen under a striped
//! mutex so two parallel admissions cannot both observe the last free slot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relaygate_core::{OwnerId, Tier};
use relaygate_store::CounterStore;
use serde::Serialize;

use crate::config::TierTable;
use crate::error::{ControlError, Result};

const STRIPES: usize = 64;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MONTH: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Which tier limit rejected an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "window", rename_all = "snake_case")]
pub enum QuotaExceededReason {
    /// Daily request limit.
    Daily {
        /// The limit that was met.
        limit: i64,
    },
    /// Monthly request limit.
    Monthly {
        /// The limit that was met.
        limit: i64,
    },
    /// Concurrent request limit.
    Concurrent {
        /// The limit that was met.
        limit: i64,
    },
}

impl fmt::Display for QuotaExceededReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily { limit } => write!(f, "daily limit of {limit} requests reached"),
            Self::Monthly { limit } => write!(f, "monthly limit of {limit} requests reached"),
            Self::Concurrent { limit } => {
                write!(f, "concurrent limit of {limit} requests reached")
            }
        }
    }
}

/// Current counter values for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Admissions in the current daily window.
    pub daily: i64,
    /// Admissions in the current monthly window.
    pub monthly: i64,
    /// Tasks currently holding a slot.
    pub concurrent: i64,
}

fn counter_key(owner_id: &OwnerId, window: &str) -> String {
    format!("quota:{owner_id}:{window}")
}

/// A held concurrency slot.
///
/// The slot is returned exactly once, by [`QuotaReservation::release`] or on
/// drop, including drops during a panic unwind.
#[must_use = "dropping a reservation releases its slot immediately"]
pub struct QuotaReservation {
    counters: Arc<dyn CounterStore>,
    owner_id: OwnerId,
    committed: bool,
    released: bool,
}

impl QuotaReservation {
    /// The owner holding the slot.
    #[must_use]
    pub const fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Keep the daily and monthly increments when the slot is released.
    ///
    /// Called once the request has been accepted for dispatch.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Whether [`commit`](Self::commit) has been called.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Return the slot now.
    pub fn release(mut self) {
        self.release_slot();
    }

    fn roll_back(&self, window: &str) {
        let key = counter_key(&self.owner_id, window);
        match self.counters.incr(&key, -1, None) {
            // The window expired while the slot was held.
            Ok(count) if count < 0 => {
                if let Err(e) = self.counters.delete(&key) {
                    tracing::error!(owner_id = %self.owner_id, window, error = %e, "Failed to clear quota counter");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(owner_id = %self.owner_id, window, error = %e, "Failed to roll back quota counter");
            }
        }
    }

    fn release_slot(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.committed {
            self.roll_back("daily");
            self.roll_back("monthly");
        }
        let key = counter_key(&self.owner_id, "concurrent");
        match self.counters.incr(&key, -1, None) {
            Ok(remaining) => {
                tracing::debug!(owner_id = %self.owner_id, remaining, "Released concurrency slot");
            }
            Err(e) => {
                tracing::error!(owner_id = %self.owner_id, error = %e, "Failed to release concurrency slot");
            }
        }
    }
}

impl fmt::Debug for QuotaReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaReservation")
            .field("owner_id", &self.owner_id)
            .field("committed", &self.committed)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        self.release_slot();
    }
}

/// Enforces per-tier request quotas.
pub struct QuotaEnforcer {
    counters: Arc<dyn CounterStore>,
    tiers: TierTable,
    stripes: Box<[Mutex<()>]>,
}

impl QuotaEnforcer {
    /// Create an enforcer over `counters` with the given tier table.
    #[must_use]
    pub fn new(counters: Arc<dyn CounterStore>, tiers: TierTable) -> Self {
        Self {
            counters,
            tiers,
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The tier table in force.
    #[must_use]
    pub const fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    fn stripe(&self, owner_id: &OwnerId) -> &Mutex<()> {
        let bytes = owner_id.as_bytes();
        let index = usize::from(bytes[0] ^ bytes[15]) % STRIPES;
        &self.stripes[index]
    }

    fn count(&self, key: &str) -> Result<i64> {
        Ok(self.counters.get(key)?.map_or(0, |c| c.count))
    }

    /// Check every count limit for the owner's tier and take a slot.
    ///
    /// Nothing is incremented when a limit is already met. The returned
    /// reservation must be committed for the request to count. Enterprise limits
    /// are unlimited, so enterprise owners are never rejected, but they still
    /// hold a slot for accounting.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::QuotaExceeded` naming the first limit met, or a
    /// store error if the counters cannot be read.
    pub fn check_and_reserve(&self, owner_id: &OwnerId, tier: Tier) -> Result<QuotaReservation> {
        let limits = self.tiers.limits(tier);
        let daily_key = counter_key(owner_id, "daily");
        let monthly_key = counter_key(owner_id, "monthly");
        let concurrent_key = counter_key(owner_id, "concurrent");

        let _guard = self.stripe(owner_id).lock();

        let daily = self.count(&daily_key)?;
        let monthly = self.count(&monthly_key)?;
        let concurrent = self.count(&concurrent_key)?;

        let exceeded = if limits.daily_requests.is_reached_by(daily) {
            limits
                .daily_requests
                .value()
                .map(|limit| QuotaExceededReason::Daily { limit })
        } else if limits.monthly_requests.is_reached_by(monthly) {
            limits
                .monthly_requests
                .value()
                .map(|limit| QuotaExceededReason::Monthly { limit })
        } else if limits.concurrent_requests.is_reached_by(concurrent) {
            limits
                .concurrent_requests
                .value()
                .map(|limit| QuotaExceededReason::Concurrent { limit })
        } else {
            None
        };

        if let Some(reason) = exceeded {
            tracing::info!(owner_id = %owner_id, tier = %tier, %reason, "Quota exceeded");
            return Err(ControlError::QuotaExceeded {
                owner_id: *owner_id,
                reason,
            });
        }

        self.counters.incr(&daily_key, 1, Some(DAY))?;
        self.counters.incr(&monthly_key, 1, Some(MONTH))?;
        let in_flight = self.counters.incr(&concurrent_key, 1, None)?;
        tracing::debug!(owner_id = %owner_id, tier = %tier, in_flight, "Reserved concurrency slot");

        Ok(QuotaReservation {
            counters: Arc::clone(&self.counters),
            owner_id: *owner_id,
            committed: false,
            released: false,
        })
    }

    /// Reject a requested completion size above the tier's `max_tokens`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` when the request is too large.
    pub fn check_tokens(&self, tier: Tier, requested: u64) -> Result<()> {
        let limit = self.tiers.limits(tier).max_tokens;
        match limit.value() {
            Some(max) if i64::try_from(requested).map_or(true, |r| r > max) => {
                Err(ControlError::Validation(format!(
                    "max_tokens {requested} exceeds the {tier} tier limit of {max}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Current counter values for an owner.
    ///
    /// # Errors
    ///
    /// Returns a store error if the counters cannot be read.
    pub fn usage(&self, owner_id: &OwnerId) -> Result<QuotaUsage> {
        Ok(QuotaUsage {
            daily: self.count(&counter_key(owner_id, "daily"))?,
            monthly: self.count(&counter_key(owner_id, "monthly"))?,
            concurrent: self.count(&counter_key(owner_id, "concurrent"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_store::MemoryCounterStore;

    fn enforcer() -> QuotaEnforcer {
        QuotaEnforcer::new(Arc::new(MemoryCounterStore::new()), TierTable::default())
    }

    fn committed(enforcer: &QuotaEnforcer, owner: &OwnerId, tier: Tier) -> QuotaReservation {
        let mut reservation = enforcer.check_and_reserve(owner, tier).unwrap();
        reservation.commit();
        reservation
    }

    #[tokio::test(start_paused = true)]
    async fn free_tier_rejects_fifty_first_request() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        for _ in 0..50 {
            committed(&enforcer, &owner, Tier::Free).release();
        }

        let err = enforcer.check_and_reserve(&owner, Tier::Free).unwrap_err();
        assert!(matches!(
            err,
            ControlError::QuotaExceeded {
                reason: QuotaExceededReason::Daily { limit: 50 },
                ..
            }
        ));
        assert_eq!(enforcer.usage(&owner).unwrap().daily, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn daily_window_expires() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        for _ in 0..50 {
            drop(committed(&enforcer, &owner, Tier::Free));
        }
        tokio::time::advance(DAY).await;

        let usage = enforcer.usage(&owner).unwrap();
        assert_eq!(usage.daily, 0);
        assert_eq!(usage.monthly, 50);
        assert!(enforcer.check_and_reserve(&owner, Tier::Free).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn enterprise_is_never_rejected() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        let held: Vec<_> = (0..500)
            .map(|_| enforcer.check_and_reserve(&owner, Tier::Enterprise).unwrap())
            .collect();
        assert_eq!(enforcer.usage(&owner).unwrap().concurrent, 500);

        drop(held);
        assert_eq!(enforcer.usage(&owner).unwrap().concurrent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_limit_and_release() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        let first = enforcer.check_and_reserve(&owner, Tier::Free).unwrap();
        let _second = enforcer.check_and_reserve(&owner, Tier::Free).unwrap();
        let err = enforcer.check_and_reserve(&owner, Tier::Free).unwrap_err();
        assert!(matches!(
            err,
            ControlError::QuotaExceeded {
                reason: QuotaExceededReason::Concurrent { limit: 2 },
                ..
            }
        ));
        assert_eq!(enforcer.usage(&owner).unwrap().daily, 2);

        first.release();
        assert!(enforcer.check_and_reserve(&owner, Tier::Free).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn uncommitted_release_rolls_back_windows() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        drop(committed(&enforcer, &owner, Tier::Free));
        let rejected_later = enforcer.check_and_reserve(&owner, Tier::Free).unwrap();
        assert_eq!(enforcer.usage(&owner).unwrap().daily, 2);
        assert!(!rejected_later.is_committed());
        rejected_later.release();

        let usage = enforcer.usage(&owner).unwrap();
        assert_eq!(usage.daily, 1);
        assert_eq!(usage.monthly, 1);
        assert_eq!(usage.concurrent, 0);

        // Rejected admissions never exhaust the free tier.
        for _ in 0..60 {
            drop(enforcer.check_and_reserve(&owner, Tier::Free).unwrap());
        }
        assert_eq!(enforcer.usage(&owner).unwrap().daily, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_after_window_expiry_clears_counter() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        let reservation = enforcer.check_and_reserve(&owner, Tier::Free).unwrap();
        tokio::time::advance(DAY).await;
        drop(reservation);

        let usage = enforcer.usage(&owner).unwrap();
        assert_eq!(usage.daily, 0);
        assert_eq!(usage.monthly, 0);
        assert_eq!(usage.concurrent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn release_happens_once() {
        let enforcer = enforcer();
        let owner = OwnerId::generate();

        let reservation = enforcer.check_and_reserve(&owner, Tier::Basic).unwrap();
        let other = enforcer.check_and_reserve(&owner, Tier::Basic).unwrap();
        reservation.release();
        assert_eq!(enforcer.usage(&owner).unwrap().concurrent, 1);
        drop(other);
        assert_eq!(enforcer.usage(&owner).unwrap().concurrent, 0);
    }

    #[test]
    fn slot_released_during_unwind() {
        let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let enforcer = QuotaEnforcer::new(Arc::clone(&counters), TierTable::default());
        let owner = OwnerId::generate();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _reservation = enforcer.check_and_reserve(&owner, Tier::Free).unwrap();
            panic!("provider adapter blew up");
        }));

        assert!(result.is_err());
        assert_eq!(enforcer.usage(&owner).unwrap().concurrent, 0);
    }

    #[test]
    fn token_ceiling_per_tier() {
        let enforcer = enforcer();
        assert!(enforcer.check_tokens(Tier::Free, 1000).is_ok());
        assert!(matches!(
            enforcer.check_tokens(Tier::Free, 1001),
            Err(ControlError::Validation(_))
        ));
        assert!(enforcer.check_tokens(Tier::Premium, 4000).is_ok());
        assert!(enforcer.check_tokens(Tier::Enterprise, u64::MAX).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn parallel_admissions_respect_concurrency() {
        let enforcer = Arc::new(enforcer());
        let owner = OwnerId::generate();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let enforcer = Arc::clone(&enforcer);
            handles.push(tokio::spawn(async move {
                enforcer.check_and_reserve(&owner, Tier::Premium).ok()
            }));
        }

        let mut held = Vec::new();
        for handle in handles {
            if let Some(reservation) = handle.await.unwrap() {
                held.push(reservation);
            }
        }
        assert_eq!(held.len(), 10);
        assert_eq!(enforcer.usage(&owner).unwrap().concurrent, 10);
    }
}
