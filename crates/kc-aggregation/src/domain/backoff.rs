//! Exponential backoff schedule for forward retries.

use std::time::Duration;

/// Delay before the given zero-based retry attempt:
/// `base * factor^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, factor: u32, max: Duration) -> Duration {
    let factor = u64::from(factor.max(1));
    let mut delay_ms = base.as_millis() as u64;
    for _ in 0..attempt {
        delay_ms = delay_ms.saturating_mul(factor);
        if delay_ms >= max.as_millis() as u64 {
            return max;
        }
    }
    Duration::from_millis(delay_ms).min(max)
}
