//! Backoff delays between retry attempts.

use rand::Rng;
use std::time::Duration;

use crate::config::schema::RetryStrategy;

/// Delay before retry number `retry` (0 for the first retry).
///
/// Constant: `initial`; linear: `initial * (retry + 1)`; exponential:
/// `initial * 2^retry`. The result never exceeds `max`, jitter included.
pub fn calculate_backoff(
    strategy: RetryStrategy,
    retry: u32,
    initial: Duration,
    max: Duration,
    jitter: bool,
) -> Duration {
    let initial_ms = initial.as_millis().min(u128::from(u64::MAX)) as u64;
    let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;

    let delay_ms = match strategy {
        RetryStrategy::Constant => initial_ms,
        RetryStrategy::Linear => initial_ms.saturating_mul(u64::from(retry) + 1),
        RetryStrategy::ExponentialBackoff => {
            initial_ms.saturating_mul(2u64.saturating_pow(retry))
        }
    };
    let capped_delay = delay_ms.min(max_ms);

    if !jitter {
        return Duration::from_millis(capped_delay);
    }

    // 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis((capped_delay + jitter).min(max_ms))
}
