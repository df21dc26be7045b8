//! Per-attempt deadlines.
//!
//! Every outbound attempt runs under a deadline. The reqwest client carries
//! the same limit; this wrapper also covers body reads and classification.

use std::future::Future;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Run `fut`, failing with [`ApiError::Timeout`] once `limit` has elapsed.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapsed() {
        let result: ApiResult<()> = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ApiError::Timeout(d)) if d == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_error_passes_through() {
        let result: ApiResult<()> =
            with_timeout(Duration::from_secs(1), async { Err(ApiError::invalid("nope")) }).await;
        assert!(matches!(result, Err(ApiError::Validation { .. })));
    }
}
