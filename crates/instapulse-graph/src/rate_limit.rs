//! Per-account sliding-window request budget.
//!
//! The limiter is advisory: it stops this process from starting requests once
//! an account's budget is spent, but the provider can still answer with its own
//! throttling errors, which the retry layer handles separately.
//!
//! Expired timestamps are dropped lazily whenever an account is queried; there
//! is no background eviction. State lives for the lifetime of the process and
//! starts empty after a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Requests allowed per account in one window.
pub const DEFAULT_MAX_REQUESTS: usize = 180;

/// Width of the sliding window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// `true` while fewer than `max_requests` calls fall inside the window.
    #[must_use]
    pub fn can_make_request(&self, account_id: &str) -> bool {
        self.can_make_request_at(account_id, Instant::now())
    }

    /// Records one request made on behalf of `account_id`.
    pub fn record_request(&self, account_id: &str) {
        self.record_request_at(account_id, Instant::now());
    }

    /// Requests still available in the current window.
    #[must_use]
    pub fn remaining(&self, account_id: &str) -> usize {
        self.remaining_at(account_id, Instant::now())
    }

    /// Time until the oldest recorded request leaves the window, or zero when
    /// nothing is recorded.
    #[must_use]
    pub fn reset_in(&self, account_id: &str) -> Duration {
        self.reset_in_at(account_id, Instant::now())
    }

    pub(crate) fn can_make_request_at(&self, account_id: &str, now: Instant) -> bool {
        let mut requests = self.lock();
        let window = self.pruned(&mut requests, account_id, now);
        window.len() < self.max_requests
    }

    pub(crate) fn record_request_at(&self, account_id: &str, now: Instant) {
        let mut requests = self.lock();
        self.pruned(&mut requests, account_id, now).push_back(now);
    }

    pub(crate) fn remaining_at(&self, account_id: &str, now: Instant) -> usize {
        let mut requests = self.lock();
        let window = self.pruned(&mut requests, account_id, now);
        self.max_requests.saturating_sub(window.len())
    }

    pub(crate) fn reset_in_at(&self, account_id: &str, now: Instant) -> Duration {
        let mut requests = self.lock();
        let window = self.pruned(&mut requests, account_id, now);
        window.front().map_or(Duration::ZERO, |oldest| {
            (*oldest + self.window).saturating_duration_since(now)
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        // A panic while holding the lock cannot leave the timestamp lists in a
        // state worse than stale, so keep using them.
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops timestamps at or beyond the window edge and returns the account's list.
    fn pruned<'a>(
        &self,
        requests: &'a mut HashMap<String, VecDeque<Instant>>,
        account_id: &str,
        now: Instant,
    ) -> &'a mut VecDeque<Instant> {
        let window = requests.entry(account_id.to_owned()).or_default();
        while window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            window.pop_front();
        }
        window
    }
}
