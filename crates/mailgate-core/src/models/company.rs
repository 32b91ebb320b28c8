/// Tenant (company) model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Company approval lifecycle; transitions are audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Suspended,
    Rejected,
}

/// Per-company request-rate caps
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateCaps {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateCaps {
    fn default() -> Self {
        Self {
            per_minute: crate::constants::DEFAULT_REQUESTS_PER_MINUTE,
            per_hour: crate::constants::DEFAULT_REQUESTS_PER_HOUR,
            per_day: crate::constants::DEFAULT_REQUESTS_PER_DAY,
        }
    }
}

/// Per-company sending caps
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SendingCaps {
    pub daily: u32,
    pub monthly: u32,
}

impl Default for SendingCaps {
    fn default() -> Self {
        Self {
            daily: crate::constants::DEFAULT_DAILY_EMAIL_CAP,
            monthly: crate::constants::DEFAULT_MONTHLY_EMAIL_CAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    /// HMAC of the API key; plaintext keys are never stored
    pub api_key_hash: String,
    /// First characters of the key, retained for identification in logs
    pub api_key_prefix: String,
    #[serde(default)]
    pub allowed_cidrs: Vec<String>,
    #[serde(default)]
    pub rate_caps: RateCaps,
    #[serde(default)]
    pub sending_caps: SendingCaps,
    pub approval_state: ApprovalState,
    pub default_from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_domain: Option<String>,
    /// Sandbox tenants may only send to this allow-list
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub sandbox_recipients: Vec<String>,
    #[serde(default)]
    pub bounce_rate: f64,
    #[serde(default)]
    pub complaint_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Whether requests from this company are admitted at all
    pub fn can_send(&self) -> bool {
        self.approval_state == ApprovalState::Approved
    }

    /// Sandbox gate: a sandbox tenant may only address its allow-list
    pub fn sandbox_allows(&self, to: &str) -> bool {
        !self.sandbox
            || self
                .sandbox_recipients
                .iter()
                .any(|r| r.eq_ignore_ascii_case(to))
    }
}
