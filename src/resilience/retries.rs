//! Retry execution.
//!
//! # Responsibilities
//! - Decide if a failure is retryable (transport errors, configured statuses)
//! - Sleep between attempts using the configured backoff strategy
//! - Honour a server `Retry-After` hint on 429
//!
//! # Design Decisions
//! - `max_retries` counts every attempt, the first one included
//! - Permanent failures (validation, auth, local rate limit) return at once
//! - The final error is returned unchanged

use std::future::Future;
use std::time::Duration;

use crate::config::schema::{RetryConfig, RetryStrategy};
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Runtime form of [`RetryConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    pub jitter: bool,
    pub retryable_status_codes: Vec<u16>,
    pub retry_on_network: bool,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            strategy: config.strategy,
            jitter: config.jitter,
            retryable_status_codes: config.retryable_status_codes.clone(),
            retry_on_network: config.retry_on_network,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Check if an error is worth another attempt.
    pub fn is_retryable(&self, error: &ApiError) -> bool {
        match error {
            ApiError::Network(_) | ApiError::Timeout(_) => self.retry_on_network,
            ApiError::Server { status, .. } => self.retryable_status_codes.contains(status),
            ApiError::RateLimited { .. } => self.retryable_status_codes.contains(&429),
            _ => false,
        }
    }

    /// Delay before retry number `retry` (0-based) after `error`.
    pub fn delay_for(&self, retry: u32, error: &ApiError) -> Duration {
        if let ApiError::RateLimited {
            retry_after: Some(hint),
            ..
        } = error
        {
            return (*hint).min(self.max_delay);
        }
        calculate_backoff(self.strategy, retry, self.initial_delay, self.max_delay, self.jitter)
    }

    /// Number of attempts that will actually be made.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(service: &str, policy: &RetryPolicy, mut op: F) -> ApiResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !policy.is_retryable(&error) {
            return Err(error);
        }
        if attempt >= attempts {
            tracing::warn!(service, attempts, error = %error, "Retries exhausted");
            return Err(error);
        }

        let delay = policy.delay_for(attempt - 1, &error);
        tracing::info!(service, attempt, delay = ?delay, error = %error, "Retrying request");
        metrics::record_retry(service);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
