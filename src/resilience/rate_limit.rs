//! Token bucket rate limiter, one per client instance.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::schema::{ExhaustionPolicy, RateLimitConfig};
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;

/// A simple token bucket with lazy refill.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    /// Take one token, or report how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Result<(), Duration> {
        self.refill(capacity, refill_rate);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        if capacity < 1.0 || refill_rate <= 0.0 {
            return Err(Duration::MAX);
        }
        let deficit = (1.0 - self.tokens) / refill_rate;
        Err(Duration::try_from_secs_f64(deficit).unwrap_or(Duration::MAX))
    }
}

#[derive(Debug)]
struct LimiterState {
    config: RateLimitConfig,
    bucket: TokenBucket,
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub available_tokens: f64,
    pub capacity: f64,
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub on_exhaustion: ExhaustionPolicy,
}

/// Admission control for outbound requests.
///
/// Refill and decrement happen under one lock, so concurrent callers can never
/// take more than `capacity` tokens out of a full bucket.
#[derive(Debug)]
pub struct RateLimiter {
    service: String,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(service: impl Into<String>, config: RateLimitConfig) -> Self {
        let bucket = TokenBucket::new(config.capacity());
        Self {
            service: service.into(),
            state: Mutex::new(LimiterState { config, bucket }),
        }
    }

    /// Take one token, applying the configured exhaustion policy.
    pub async fn acquire(&self) -> ApiResult<()> {
        let started = Instant::now();

        loop {
            let (wait, policy, max_wait) = {
                let mut state = self.state.lock().await;
                let capacity = state.config.capacity();
                let rate = state.config.refill_rate();
                match state.bucket.try_acquire(capacity, rate) {
                    Ok(()) => return Ok(()),
                    Err(wait) => (
                        wait,
                        state.config.on_exhaustion,
                        Duration::from_millis(state.config.max_wait_ms),
                    ),
                }
            };

            match policy {
                ExhaustionPolicy::FailFast => return Err(self.exhausted()),
                ExhaustionPolicy::WaitAndRetry => {
                    if started.elapsed().saturating_add(wait) > max_wait {
                        return Err(self.exhausted());
                    }
                    tracing::debug!(service = %self.service, wait = ?wait, "Waiting for rate limit token");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn exhausted(&self) -> ApiError {
        tracing::warn!(service = %self.service, "Rate limit exceeded");
        metrics::record_rate_limited(&self.service);
        ApiError::RateLimitExceeded {
            service: self.service.clone(),
        }
    }

    /// Current token count after refill.
    pub async fn status(&self) -> RateLimitStatus {
        let mut state = self.state.lock().await;
        let capacity = state.config.capacity();
        let rate = state.config.refill_rate();
        state.bucket.refill(capacity, rate);

        RateLimitStatus {
            available_tokens: state.bucket.tokens,
            capacity,
            requests_per_window: state.config.requests_per_window,
            window_secs: state.config.window_secs,
            on_exhaustion: state.config.on_exhaustion,
        }
    }

    /// Swap the limiter parameters, keeping at most the new capacity in the bucket.
    pub async fn update_config(&self, config: RateLimitConfig) {
        let mut state = self.state.lock().await;
        let old_capacity = state.config.capacity();
        let old_rate = state.config.refill_rate();
        state.bucket.refill(old_capacity, old_rate);

        state.bucket.tokens = state.bucket.tokens.min(config.capacity());
        tracing::info!(
            service = %self.service,
            requests_per_window = config.requests_per_window,
            window_secs = config.window_secs,
            "Rate limit updated"
        );
        state.config = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(requests: u32, window_secs: u64, policy: ExhaustionPolicy) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: requests,
            window_secs,
            burst_size: None,
            on_exhaustion: policy,
            max_wait_ms: 5_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_after_capacity() {
        let limiter = RateLimiter::new("test", config(2, 60, ExhaustionPolicy::FailFast));

        assert!(limiter.acquire().await.is_ok());
        assert!(limiter.acquire().await.is_ok());
        match limiter.acquire().await {
            Err(ApiError::RateLimitExceeded { service }) => assert_eq!(service, "test"),
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_refill() {
        let limiter = RateLimiter::new("test", config(2, 1, ExhaustionPolicy::WaitAndRetry));

        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_max_wait() {
        let mut cfg = config(1, 60, ExhaustionPolicy::WaitAndRetry);
        cfg.max_wait_ms = 1_000;
        let limiter = RateLimiter::new("test", cfg);

        limiter.acquire().await.unwrap();
        assert!(matches!(
            limiter.acquire().await,
            Err(ApiError::RateLimitExceeded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_bounded_by_capacity() {
        let limiter = Arc::new(RateLimiter::new("test", config(5, 60, ExhaustionPolicy::FailFast)));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await.is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new("test", config(3, 1, ExhaustionPolicy::FailFast));
        limiter.acquire().await.unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        let status = limiter.status().await;
        assert_eq!(status.available_tokens, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_size_sets_capacity() {
        let mut cfg = config(1, 60, ExhaustionPolicy::FailFast);
        cfg.burst_size = Some(3);
        let limiter = RateLimiter::new("test", cfg);

        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        assert!(limiter.acquire().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_clamps_tokens() {
        let limiter = RateLimiter::new("test", config(10, 60, ExhaustionPolicy::FailFast));
        limiter.update_config(config(1, 60, ExhaustionPolicy::FailFast)).await;

        let status = limiter.status().await;
        assert_eq!(status.capacity, 1.0);
        assert_eq!(status.available_tokens, 1.0);

        limiter.acquire().await.unwrap();
        assert!(limiter.acquire().await.is_err());
    }
}
