//! Sliding-window rate limiter for upstream API calls

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::clock::deadline;

/// Admits at most `capacity` calls in any trailing `window`
///
/// The window stores, for each admission, the instant it leaves the window.
/// Those instants are non-decreasing, so the front is always the next slot to
/// free up. No method blocks or sleeps.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    expiries: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            expiries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an admission and return true if the window has room
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut expiries = self.lock();
        prune(&mut expiries, now);

        if expiries.len() < self.capacity {
            expiries.push_back(deadline(now, self.window));
            true
        } else {
            false
        }
    }

    /// Time until the oldest recorded admission leaves the window
    ///
    /// Zero when nothing is recorded or the oldest entry has already expired.
    pub fn retry_after(&self) -> Duration {
        let now = Instant::now();
        self.lock()
            .front()
            .map_or(Duration::ZERO, |expiry| expiry.saturating_duration_since(now))
    }

    /// Admissions still available right now
    pub fn remaining(&self) -> usize {
        let now = Instant::now();
        let live = self.lock().iter().filter(|expiry| **expiry > now).count();
        self.capacity.saturating_sub(live)
    }

    /// Fill the window as if `capacity` calls were admitted just now
    ///
    /// Used when the upstream reports throttling without saying for how long.
    pub fn force_fill(&self) {
        let until = deadline(Instant::now(), self.window);
        self.fill(until);
        log::warn!("Rate limiter filled for {}s", self.window.as_secs());
    }

    /// Deny every call until `until`
    ///
    /// Used when the upstream names the instant at which it accepts calls again.
    pub fn block_until(&self, until: Instant) {
        self.fill(until);
        log::warn!(
            "Rate limiter blocked for {}s",
            until.saturating_duration_since(Instant::now()).as_secs()
        );
    }

    fn fill(&self, until: Instant) {
        let mut expiries = self.lock();
        expiries.clear();
        expiries.extend(std::iter::repeat(until).take(self.capacity));
    }

    // Every critical section leaves the deque consistent
    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.expiries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prune(expiries: &mut VecDeque<Instant>, now: Instant) {
    while expiries.front().is_some_and(|expiry| *expiry <= now) {
        expiries.pop_front();
    }
}
