//! Bounded retry with backoff for provider calls.
//!
//! The generation provider sits behind a network; transient transport errors
//! and throttling responses are expected and must not surface as session
//! failures until the configured attempt budget is spent. Errors classify
//! themselves through [`Retryable`] so the loop can pick the right delay.

use std::time::Duration;

use tracing::debug;

/// How a failed operation should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth retrying after the normal delay.
    Transient,
    /// Worth retrying after an extended delay (rate limit, model loading).
    Throttled,
    /// Retrying cannot help (bad credentials, malformed payload).
    Fatal,
}

/// Errors that know whether retrying them makes sense.
pub trait Retryable {
    /// Classifies this error for the retry loop.
    fn retry_class(&self) -> RetryClass;
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration with custom values.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Calculates the wait duration after a given failed attempt.
    ///
    /// Backoff is linear in the attempt number (first retry waits the base
    /// delay, the second twice that, and so on). A throttled failure doubles
    /// the result, since rate limits need more headroom than flaky transport.
    #[must_use]
    pub const fn delay_for(&self, attempt: u32, throttled: bool) -> Duration {
        let scaled = self.base_delay.saturating_mul(attempt + 1);
        if throttled {
            scaled.saturating_mul(2)
        } else {
            scaled
        }
    }

    /// Returns true if the given number of completed attempts leaves room for
    /// another.
    #[must_use]
    pub const fn has_attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Runs a fallible async operation with bounded backoff.
///
/// Retries only errors whose [`RetryClass`] allows it; fatal errors and the
/// final attempt's error are returned to the caller unchanged.
///
/// # Errors
///
/// Returns the last error once the attempt budget is exhausted, or the first
/// fatal error encountered.
pub async fn run_with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let class = e.retry_class();
                let attempts_made = attempt + 1;
                if class == RetryClass::Fatal || !config.has_attempts_remaining(attempts_made) {
                    return Err(e);
                }
                let delay = config.delay_for(attempt, class == RetryClass::Throttled);
                debug!(
                    error = %e,
                    attempt = attempts_made,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt = attempts_made;
            }
        }
    }
}
