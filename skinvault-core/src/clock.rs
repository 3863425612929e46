//! Deadline arithmetic shared by the cache and the rate limiter

use std::time::Duration;

use tokio::time::Instant;

/// Furthest deadline handed out, roughly 30 years ahead
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, capped at `now + FAR_FUTURE` instead of overflowing
pub fn deadline(now: Instant, after: Duration) -> Instant {
    now + after.min(FAR_FUTURE)
}
