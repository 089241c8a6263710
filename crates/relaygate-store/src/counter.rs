//! TTL counters for quota windows.
//!
//! The gateway only needs `get`, `incr`, `set_with_ttl`, and `delete`, which
//! maps onto any cache or KV service. Expiry is measured with
//! `tokio::time::Instant` so paused-clock tests can move past a window.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// A counter value together with the end of its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCounter {
    /// Store key, e.g. `quota:<owner>:daily`.
    pub scope_key: String,
    /// Current count.
    pub count: i64,
    /// When the counter disappears, if it has a TTL.
    pub window_expires_at: Option<Instant>,
}

/// Key-value counter store with TTL support.
///
/// Every method is a single atomic operation on one key.
pub trait CounterStore: Send + Sync {
    /// Read a counter, or `None` if it is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn get(&self, key: &str) -> Result<Option<QuotaCounter>>;

    /// Add `delta` to a counter and return the new value.
    ///
    /// A missing or expired counter starts at zero and receives `ttl`; an
    /// existing counter keeps its original expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64>;

    /// Overwrite a counter with a fresh value and TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn set_with_ttl(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()>;

    /// Remove a counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process `CounterStore`.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Returns true if no live entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> Result<Option<QuotaCounter>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| QuotaCounter {
                scope_key: key.to_string(),
                count: entry.value,
                window_expires_at: entry.expires_at,
            }))
    }

    fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if !entry.is_live(now) {
                    *entry = Entry {
                        value: 0,
                        expires_at: ttl.map(|ttl| now + ttl),
                    };
                }
            })
            .or_insert_with(|| Entry {
                value: 0,
                expires_at: ttl.map(|ttl| now + ttl),
            });
        entry.value = entry.value.saturating_add(delta);
        Ok(entry.value)
    }

    fn set_with_ttl(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
