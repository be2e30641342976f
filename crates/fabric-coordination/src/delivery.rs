//! At-least-once delivery bookkeeping: exponential backoff with jitter,
//! capped at 10 attempts over an hour.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

pub const MAX_ATTEMPTS: u32 = 10;
pub const MAX_WINDOW: Duration = Duration::hours(1);

/// Backoff doubles each attempt starting at 5s, jittered +/-20%, and is
/// clamped so the cumulative window never exceeds an hour across 10
/// attempts.
pub fn next_retry_at(now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
    let base_seconds = 5u64.saturating_mul(1u64 << attempts.min(10));
    let capped_seconds = base_seconds.min(MAX_WINDOW.num_seconds() as u64);
    let jitter_fraction: f64 = rand::thread_rng().gen_range(0.8..1.2);
    let jittered = (capped_seconds as f64 * jitter_fraction) as i64;
    now + Duration::seconds(jittered.max(1))
}

pub fn attempts_exhausted(attempts: u32) -> bool {
    attempts >= MAX_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_retry_is_strictly_in_the_future() {
        let now = Utc::now();
        assert!(next_retry_at(now, 0) > now);
    }

    #[test]
    fn attempts_exhausted_caps_at_ten() {
        assert!(!attempts_exhausted(9));
        assert!(attempts_exhausted(10));
    }
}
