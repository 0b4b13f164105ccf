//! Retry with exponential back-off and jitter for provider calls.
//!
//! [`with_retry`] wraps an operation that performs exactly one outbound call.
//! Provider throttling and 5xx responses are retried; everything else,
//! including the local [`GraphError::RateLimitExceeded`], is returned at once.

use std::future::Future;
use std::time::Duration;

use crate::error::GraphError;
use crate::pacing::Sleeper;

const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Back-off settings for [`with_retry`].
///
/// An operation is attempted at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the uniform random jitter added to each
    /// computed delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1_000),
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt + jitter`, where `attempt` is zero-indexed.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, jitter: Duration) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
            .saturating_add(jitter)
    }

    /// Longest delay the policy ever sleeps: the final back-off step with
    /// maximum jitter. Provider `Retry-After` values are capped here.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.backoff_delay(self.max_retries, self.max_jitter)
    }

    fn random_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(0..max_ms))
    }
}

/// How a failed attempt should be retried, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryClass {
    RateLimited { retry_after: Option<Duration> },
    ServerError,
}

/// Returns `Some` for errors worth retrying after a back-off delay.
///
/// **Retriable:**
/// - [`GraphError::ProviderRateLimited`]: HTTP 429 or a throttling code.
/// - [`GraphError::ProviderServerError`]: HTTP 5xx.
///
/// Everything else (auth errors, 4xx, malformed bodies, transport failures,
/// local limiter refusals) is not retriable.
pub(crate) fn classify(err: &GraphError) -> Option<RetryClass> {
    match err {
        GraphError::ProviderRateLimited { retry_after_secs } => Some(RetryClass::RateLimited {
            retry_after: retry_after_secs.map(Duration::from_secs),
        }),
        GraphError::ProviderServerError { .. } => Some(RetryClass::ServerError),
        _ => None,
    }
}

/// Runs `operation` until it succeeds, fails with a non-retriable error, or
/// `policy.max_retries` retries are spent. The last error is returned on
/// exhaustion; the final attempt is never followed by a sleep.
///
/// Rate-limit responses honour the provider's `Retry-After` when present,
/// capped at [`RetryPolicy::max_delay`]; otherwise, and for server errors,
/// the delay is [`RetryPolicy::backoff_delay`] with random jitter.
///
/// # Errors
///
/// Returns the first non-retriable error, or the last retriable one once
/// retries are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, GraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(class) = classify(&err) else {
            return Err(err);
        };
        if attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = match class {
            RetryClass::RateLimited {
                retry_after: Some(retry_after),
            } => retry_after.min(policy.max_delay()),
            RetryClass::RateLimited { retry_after: None } | RetryClass::ServerError => {
                policy.backoff_delay(attempt, policy.random_jitter())
            }
        };

        tracing::warn!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "provider call failed; retrying after back-off"
        );
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}
