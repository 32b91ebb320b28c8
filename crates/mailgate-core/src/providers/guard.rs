/// Guard rails around every provider call
///
/// Each (provider, region) pair gets a circuit breaker and a token-bucket
/// rate limiter aligned with the provider's published send rate; every
/// call runs under a hard timeout. Breaker and bucket are per-process
/// state: cluster-wide coordination is approximate by design, each
/// process enforcing its local share.
use super::{ProviderDriver, RenderedEmail, SendOutcome, SendQuota};
use crate::config::ProviderConfig;
use crate::error::{ErrorCategory, GatewayError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum CircuitState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Opens after N consecutive TRANSIENT/TIMEOUT failures; after the
/// cool-down a single half-open probe decides between closing again and
/// re-opening.
pub struct CircuitBreaker {
    state: tokio::sync::Mutex<CircuitState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: tokio::sync::Mutex::new(CircuitState::Closed {
                consecutive_failures: 0,
            }),
            threshold,
            cooldown,
        }
    }

    /// Admits or rejects a call. While open, callers fail fast.
    pub async fn check(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed { .. } | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    *state = CircuitState::HalfOpen;
                    debug!("Circuit half-open, admitting probe call");
                    Ok(())
                } else {
                    Err(GatewayError::ProviderCircuitOpen(
                        "Circuit breaker is open".to_string(),
                    ))
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        *state = CircuitState::Closed {
            consecutive_failures: 0,
        };
    }

    /// Only transient and timeout failures trip the breaker; permanent
    /// rejections say nothing about provider health.
    pub async fn record_failure(&self, category: ErrorCategory) {
        if !matches!(
            category,
            ErrorCategory::TransientError | ErrorCategory::TimeoutError
        ) {
            return;
        }
        let mut state = self.state.lock().await;
        *state = match *state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.threshold {
                    warn!(failures = failures, "Circuit breaker opened");
                    CircuitState::Open {
                        until: Instant::now() + self.cooldown,
                    }
                } else {
                    CircuitState::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            CircuitState::HalfOpen => {
                warn!("Half-open probe failed, circuit re-opened");
                CircuitState::Open {
                    until: Instant::now() + self.cooldown,
                }
            }
            open => open,
        };
    }

    pub async fn is_open(&self) -> bool {
        matches!(
            *self.state.lock().await,
            CircuitState::Open { until } if Instant::now() < until
        )
    }
}

/// Token bucket aligned with the provider's send-rate cap
pub struct TokenBucket {
    state: tokio::sync::Mutex<(f64, Instant)>,
    capacity: f64,
    refill_per_second: f64,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64) -> Self {
        let capacity = rate_per_second.max(1.0);
        Self {
            state: tokio::sync::Mutex::new((capacity, Instant::now())),
            capacity,
            refill_per_second: rate_per_second.max(0.1),
        }
    }

    async fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        let (tokens, last_refill) = *state;
        let elapsed = last_refill.elapsed().as_secs_f64();
        let tokens = (tokens + elapsed * self.refill_per_second).min(self.capacity);
        let now = Instant::now();
        if tokens >= 1.0 {
            *state = (tokens - 1.0, now);
            Ok(())
        } else {
            *state = (tokens, now);
            let wait = (1.0 - tokens) / self.refill_per_second;
            Err(Duration::from_secs_f64(wait))
        }
    }

    /// Waits until a token is available
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

/// A driver wrapped with timeout, circuit breaker and rate limiter
pub struct GuardedProvider {
    inner: Arc<dyn ProviderDriver>,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
    timeout: Duration,
}

impl GuardedProvider {
    pub fn new(inner: Arc<dyn ProviderDriver>, config: &ProviderConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config.circuit_open_threshold, config.circuit_cooldown),
            bucket: TokenBucket::new(config.send_rate_per_second),
            timeout: config.send_timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn is_available(&self) -> bool {
        !self.breaker.is_open().await
    }

    /// Dispatches under the full guard stack. A timeout aborts the
    /// in-flight call and classifies the attempt as TIMEOUT_ERROR.
    pub async fn send(&self, email: &RenderedEmail) -> Result<SendOutcome, GatewayError> {
        self.breaker.check().await?;
        self.bucket.acquire().await;

        let result = match tokio::time::timeout(self.timeout, self.inner.send(email)).await {
            Ok(inner_result) => inner_result,
            Err(_) => Err(GatewayError::ProviderTimeout(format!(
                "Provider {} exceeded {} ms",
                self.inner.name(),
                self.timeout.as_millis()
            ))),
        };

        match &result {
            Ok(_) => self.breaker.record_success().await,
            Err(e) => self.breaker.record_failure(e.category()).await,
        }
        result
    }

    pub async fn verify_connection(&self) -> Result<(), GatewayError> {
        self.inner.verify_connection().await
    }

    pub async fn get_quota(&self) -> Result<SendQuota, GatewayError> {
        self.inner.get_quota().await
    }
}
