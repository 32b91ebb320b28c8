/// Sending-domain verification state
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    Pending,
    Verified,
    Failed,
    TemporaryFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DkimStatus {
    Pending,
    Verified,
    Failed,
}

/// Gradual ramp-up of daily volume for a freshly verified domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupPlan {
    pub daily_limit: u32,
    pub weekly_increase: u32,
    pub cap: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub company_id: Uuid,
    /// Lower-cased domain name
    pub name: String,
    pub status: DomainStatus,
    pub dkim_status: DkimStatus,
    /// DKIM selectors to publish as `<selector>._domainkey.<domain>`
    #[serde(default)]
    pub dkim_selectors: Vec<String>,
    /// Provider-issued DKIM tokens
    #[serde(default)]
    pub dkim_tokens: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    /// Consecutive successful probes; VERIFIED requires a streak
    #[serde(default)]
    pub probe_successes: u32,
    /// Consecutive failed probes, drives the re-check backoff
    #[serde(default)]
    pub probe_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup: Option<WarmupPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// A send is admitted only from a VERIFIED domain (sandbox excepted,
    /// enforced by the caller)
    pub fn allows_sending(&self) -> bool {
        self.status == DomainStatus::Verified
    }

    /// Applies one probe outcome to the state machine. Hard FAILED is
    /// never entered here; only operator action sets it.
    pub fn apply_probe(&mut self, verified: bool, dkim_verified: bool, now: DateTime<Utc>) {
        self.last_checked = Some(now);
        self.dkim_status = if dkim_verified {
            DkimStatus::Verified
        } else if self.dkim_status == DkimStatus::Verified {
            // a formerly verified DKIM that stops resolving is a failure
            DkimStatus::Failed
        } else {
            DkimStatus::Pending
        };

        if verified && dkim_verified {
            self.probe_failures = 0;
            self.probe_successes += 1;
            if self.probe_successes >= crate::constants::DOMAIN_VERIFY_SUCCESS_STREAK {
                self.status = DomainStatus::Verified;
            }
        } else {
            self.probe_successes = 0;
            self.probe_failures += 1;
            // soft degradation; hard FAILED is operator-only
            if self.status != DomainStatus::Failed {
                self.status = DomainStatus::TemporaryFailure;
            }
        }
        self.updated_at = now;
    }

    /// Interval until the next probe: exponential in the failure count
    pub fn next_probe_delay(&self) -> std::time::Duration {
        let base = crate::constants::DOMAIN_PROBE_BASE_SECONDS;
        let max = crate::constants::DOMAIN_PROBE_MAX_SECONDS;
        let secs = base
            .saturating_mul(2u64.saturating_pow(self.probe_failures.min(16)))
            .min(max);
        std::time::Duration::from_secs(secs)
    }
}
