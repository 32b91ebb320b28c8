/// Admission control: request-rate caps, sending caps, IP allow-list
///
/// Counters are windowed atomic increments with TTL in the queue's
/// backing store; each check is increment-then-compare so concurrent
/// requests cannot slip under a cap together.
use crate::error::GatewayError;
use crate::models::Company;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{Datelike, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments the counter for `key` in the window starting
    /// at `window_start`, returning the new value
    async fn increment(
        &self,
        key: &str,
        window_start: u64,
        ttl_seconds: u64,
    ) -> Result<u64, GatewayError>;
}

// ============================================================================
// DynamoDB counter store
// ============================================================================

pub struct DynamoDbCounterStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbCounterStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl CounterStore for DynamoDbCounterStore {
    async fn increment(
        &self,
        key: &str,
        window_start: u64,
        ttl_seconds: u64,
    ) -> Result<u64, GatewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let ttl = now + ttl_seconds;

        let response = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("counter_key", AttributeValue::S(key.to_string()))
            .key("window", AttributeValue::N(window_start.to_string()))
            .update_expression("ADD hits :inc SET #t = :ttl")
            .expression_attribute_names("#t", "ttl")
            .expression_attribute_values(":inc", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":ttl", AttributeValue::N(ttl.to_string()))
            .return_values(aws_sdk_dynamodb::types::ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Counter increment failed: {}", e)))?;

        let count = response
            .attributes()
            .and_then(|attrs| attrs.get("hits"))
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(1);
        Ok(count)
    }
}

// ============================================================================
// In-memory counter store
// ============================================================================

#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: tokio::sync::Mutex<HashMap<(String, u64), u64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(
        &self,
        key: &str,
        window_start: u64,
        _ttl_seconds: u64,
    ) -> Result<u64, GatewayError> {
        let mut counters = self.counters.lock().await;
        let count = counters
            .entry((key.to_string(), window_start))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

// ============================================================================
// Admission control
// ============================================================================

pub struct AdmissionControl {
    counters: std::sync::Arc<dyn CounterStore>,
}

impl AdmissionControl {
    pub fn new(counters: std::sync::Arc<dyn CounterStore>) -> Self {
        Self { counters }
    }

    async fn check_window(
        &self,
        key: String,
        limit: u32,
        window_seconds: u64,
    ) -> Result<(), GatewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let window_start = (now / window_seconds) * window_seconds;
        let ttl = window_seconds + 3600;

        let count = self.counters.increment(&key, window_start, ttl).await?;
        if count > limit as u64 {
            warn!(
                key = %key,
                count = count,
                limit = limit,
                window_seconds = window_seconds,
                "Rate limit exceeded"
            );
            return Err(GatewayError::RateLimitExceeded(format!(
                "{} requests in {} seconds (limit {})",
                count, window_seconds, limit
            )));
        }
        debug!(key = %key, count = count, limit = limit, "Rate limit check passed");
        Ok(())
    }

    /// Per-company request caps (minute / hour / day)
    pub async fn check_request_rate(&self, company: &Company) -> Result<(), GatewayError> {
        let id = company.id;
        self.check_window(format!("req:{}:minute", id), company.rate_caps.per_minute, 60)
            .await?;
        self.check_window(format!("req:{}:hour", id), company.rate_caps.per_hour, 3600)
            .await?;
        self.check_window(format!("req:{}:day", id), company.rate_caps.per_day, 86400)
            .await?;
        Ok(())
    }

    /// Per-company sending caps (daily / monthly). Counted once per
    /// stage: the ingestion edge uses `accept`, the worker re-check uses
    /// `dispatch`, so the two checks never consume each other's budget.
    pub async fn check_sending_caps(
        &self,
        company: &Company,
        stage: &str,
    ) -> Result<(), GatewayError> {
        let id = company.id;
        self.check_window(
            format!("{}:{}:day", stage, id),
            company.sending_caps.daily,
            86400,
        )
        .await
        .map_err(|e| match e {
            GatewayError::RateLimitExceeded(msg) => {
                GatewayError::QuotaExceeded(format!("daily email cap: {}", msg))
            }
            other => other,
        })?;

        // calendar-month window keyed by year-month
        let now = Utc::now();
        let month_key = format!("{}:{}:month:{}-{:02}", stage, id, now.year(), now.month());
        let count = self
            .counters
            .increment(&month_key, 0, 35 * 86400)
            .await?;
        if count > company.sending_caps.monthly as u64 {
            return Err(GatewayError::QuotaExceeded(format!(
                "monthly email cap reached ({})",
                company.sending_caps.monthly
            )));
        }
        Ok(())
    }

    /// Warm-up cap for a domain with an active warm-up plan
    pub async fn check_warmup_cap(
        &self,
        company_id: Uuid,
        domain: &crate::models::Domain,
    ) -> Result<(), GatewayError> {
        let Some(plan) = domain.warmup.as_ref().filter(|p| p.active) else {
            return Ok(());
        };
        self.check_window(
            format!("warmup:{}:{}:day", company_id, domain.name),
            plan.daily_limit.min(plan.cap),
            86400,
        )
        .await
        .map_err(|e| match e {
            GatewayError::RateLimitExceeded(msg) => {
                GatewayError::QuotaExceeded(format!("warm-up cap: {}", msg))
            }
            other => other,
        })
    }
}

/// CIDR allow-list check. An empty list admits every address.
pub fn ip_allowed(allowed_cidrs: &[String], peer: IpAddr) -> bool {
    if allowed_cidrs.is_empty() {
        return true;
    }
    allowed_cidrs.iter().any(|cidr| cidr_contains(cidr, peer))
}

fn cidr_contains(cidr: &str, addr: IpAddr) -> bool {
    let (network, prefix) = match cidr.split_once('/') {
        Some((network, prefix)) => match prefix.parse::<u8>() {
            Ok(p) => (network, p),
            Err(_) => return false,
        },
        // bare address means an exact match
        None => return cidr.parse::<IpAddr>() == Ok(addr),
    };

    match (network.parse::<IpAddr>(), addr) {
        (Ok(IpAddr::V4(net)), IpAddr::V4(ip)) => {
            if prefix > 32 {
                return false;
            }
            let mask = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - prefix)
            };
            (u32::from(net) & mask) == (u32::from(ip) & mask)
        }
        (Ok(IpAddr::V6(net)), IpAddr::V6(ip)) => {
            if prefix > 128 {
                return false;
            }
            let mask = if prefix == 0 {
                0
            } else {
                u128::MAX << (128 - prefix)
            };
            (u128::from(net) & mask) == (u128::from(ip) & mask)
        }
        _ => false,
    }
}
