/// Exponential backoff with bounded jitter
///
/// Two consumers share this module: the worker's retry scheduling for
/// failed dispatches (`retry_delay`) and infrastructure calls that retry
/// in place (`retry_with_backoff`).
use crate::constants::{BASE_DELAY_MS, JITTER_FACTOR, MAX_ATTEMPTS, MAX_DELAY_MS};
use crate::error::GatewayError;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            jitter_factor: JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            jitter_factor: JITTER_FACTOR,
        }
    }

    /// Delay before attempt N (1-based):
    /// min(MAX_DELAY, BASE × 2^(N−1)) ± JITTER_FACTOR × delay.
    /// Never negative; jitter is bounded.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let exponential_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let capped_ms = exponential_ms.min(self.max_delay_ms);

        // jitter in [−j, +j]
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor;
        let jittered_ms = (capped_ms as f64 * (1.0 + jitter)).max(0.0) as u64;

        Duration::from_millis(jittered_ms)
    }

    /// The inclusive bounds `retry_delay` may produce for a given attempt
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let exponent = attempt.saturating_sub(1);
        let capped_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms) as f64;
        let lo = (capped_ms * (1.0 - self.jitter_factor)).max(0.0) as u64;
        let hi = (capped_ms * (1.0 + self.jitter_factor)).ceil() as u64;
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }
}

/// Retries an async infrastructure operation in place. Dispatch retries go
/// through the queue with a delay instead; this is for storage/queue client
/// calls only.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    config: RetryConfig,
    operation_name: &str,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() {
                    warn!(
                        operation = operation_name,
                        error = %e,
                        "Permanent error, not retrying"
                    );
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Max attempts exhausted"
                    );
                    return Err(e);
                }

                let delay = config.retry_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Retryable error, will retry after delay"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_within_spec_bounds() {
        let config = RetryConfig::default();
        // attempt 1: d = 1000ms, range [750, 1250]
        for _ in 0..100 {
            let d = config.retry_delay(1).as_millis() as u64;
            assert!((750..=1250).contains(&d), "attempt 1 delay {} out of range", d);
        }
        // attempt 2: d = 2000ms, range [1500, 2500]
        for _ in 0..100 {
            let d = config.retry_delay(2).as_millis() as u64;
            assert!((1500..=2500).contains(&d), "attempt 2 delay {} out of range", d);
        }
        // large attempt capped at 60s ± 25%
        for _ in 0..100 {
            let d = config.retry_delay(30).as_millis() as u64;
            assert!((45_000..=75_000).contains(&d), "capped delay {} out of range", d);
        }
    }

    #[test]
    fn test_delay_bounds_match() {
        let config = RetryConfig::default();
        let (lo, hi) = config.delay_bounds(3);
        assert_eq!(lo, Duration::from_millis(3000));
        assert_eq!(hi, Duration::from_millis(5000));
        for _ in 0..100 {
            let d = config.retry_delay(3);
            assert!(d >= lo && d <= hi);
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    let count = c.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(GatewayError::Storage("transient".to_string()))
                    } else {
                        Ok::<i32, GatewayError>(42)
                    }
                }
            },
            RetryConfig::new(5, 10, 100),
            "test_op",
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, GatewayError>(GatewayError::Validation("bad".to_string()))
                }
            },
            RetryConfig::new(5, 10, 100),
            "test_op",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_attempts_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, GatewayError>(GatewayError::Queue("down".to_string()))
                }
            },
            RetryConfig::new(3, 10, 100),
            "test_op",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
