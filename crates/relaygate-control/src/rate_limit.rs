//! Sliding-log rate limiter.
//!
//! Each key keeps the instants of its admissions inside the trailing window.
//! Prune, check, and insert for one key run under that key's mutex, so
//! parallel callers sharing a key never over-admit.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{RateLimitPolicy, RateLimitTable};

struct Window {
    policy: RateLimitPolicy,
    admitted: VecDeque<Instant>,
}

impl Window {
    const fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            admitted: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.policy.window();
        while self
            .admitted
            .front()
            .is_some_and(|at| now.duration_since(*at) >= window)
        {
            self.admitted.pop_front();
        }
    }

    fn is_full(&self) -> bool {
        self.admitted.len() >= self.policy.requests as usize
    }
}

/// Per-key sliding-window limiter shared by every request handler.
pub struct RateLimiter {
    table: RateLimitTable,
    windows: Mutex<HashMap<String, Arc<Mutex<Window>>>>,
}

impl RateLimiter {
    /// Create a limiter using `table` for class lookups.
    #[must_use]
    pub fn new(table: RateLimitTable) -> Self {
        Self {
            table,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// The key used for an owner and endpoint class.
    #[must_use]
    pub fn key_for(owner: impl Display, class: &str) -> String {
        format!("{owner}:{class}")
    }

    fn window(&self, key: &str, policy: RateLimitPolicy) -> Arc<Mutex<Window>> {
        let mut windows = self.windows.lock();
        Arc::clone(
            windows
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Window::new(policy)))),
        )
    }

    /// Try to admit one request for `key` under the default policy.
    ///
    /// A key keeps the policy it was first seen with.
    pub fn acquire(&self, key: &str) -> bool {
        self.acquire_with(key, self.table.default)
    }

    /// Try to admit one request for `owner` on an endpoint class.
    pub fn acquire_for(&self, owner: impl Display, class: &str) -> bool {
        let key = Self::key_for(owner, class);
        self.acquire_with(&key, self.table.policy_for(class))
    }

    fn acquire_with(&self, key: &str, policy: RateLimitPolicy) -> bool {
        let window = self.window(key, policy);
        let mut window = window.lock();
        let now = Instant::now();

        window.prune(now);
        if window.is_full() {
            tracing::debug!(key, limit = window.policy.requests, "Rate limit reached");
            return false;
        }
        window.admitted.push_back(now);
        true
    }

    /// Admissions left for `key` in the current window.
    #[must_use]
    pub fn remaining(&self, key: &str) -> u32 {
        let windows = self.windows.lock();
        let Some(window) = windows.get(key) else {
            return self.table.default.requests;
        };
        let mut window = window.lock();
        window.prune(Instant::now());
        let used = u32::try_from(window.admitted.len()).unwrap_or(u32::MAX);
        window.policy.requests.saturating_sub(used)
    }

    /// Time until `key` can be admitted again, or `None` if it can be now.
    #[must_use]
    pub fn retry_after(&self, key: &str) -> Option<Duration> {
        let windows = self.windows.lock();
        let mut window = windows.get(key)?.lock();
        let now = Instant::now();
        window.prune(now);
        if !window.is_full() {
            return None;
        }
        let oldest = *window.admitted.front()?;
        Some(window.policy.window().saturating_sub(now.duration_since(oldest)))
    }

    /// Drop keys whose windows have emptied. Returns how many were removed.
    ///
    /// A key is only dropped while no caller holds its window.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let mut window = window.lock();
            window.prune(now);
            !window.admitted.is_empty()
        });
        before - windows.len()
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}
