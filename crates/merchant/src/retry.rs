//! Bounded retry on platform throttling.
//!
//! Only HTTP 429 is retried. Credential rejections and other failures
//! return immediately, mapped through `From<ApiError> for MerchantError`.

use std::future::Future;

use crate::{
    config::RetryPolicy,
    error::{ApiError, MerchantError},
};

/// Runs `call` until it succeeds, fails with something other than
/// throttling, or has been made `policy.max_attempts` times.
///
/// Between attempts it sleeps for the response's `Retry-After` hint, or
/// the fallback delay, capped at `policy.max_delay`.
///
/// # Errors
///
/// Returns [`MerchantError::RateLimited`] once the attempts are spent, or
/// the mapped error of the first non-throttle failure.
pub async fn with_throttle_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut call: F,
) -> Result<T, MerchantError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(ApiError::Throttled { retry_after }) => {
                if attempt >= policy.max_attempts {
                    tracing::warn!(counter = label, attempts = attempt, "giving up after repeated throttling");
                    return Err(MerchantError::RateLimited { attempts: attempt, retry_after });
                }

                let delay = policy.delay_for(retry_after);
                tracing::debug!(
                    counter = label,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "throttled, retrying"
                );
                tokio::time::sleep(delay).await;
            },
            Err(other) => return Err(other.into()),
        }
    }
}
