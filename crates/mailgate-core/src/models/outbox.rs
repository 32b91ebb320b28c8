/// Email outbox: the durable unit of work, one row per accepted request
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbox lifecycle. Transitions are monotone except RETRYING↔PROCESSING;
/// SENT and FAILED are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Enqueued,
    Processing,
    Sent,
    Failed,
    Retrying,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    /// Legal state-machine edges. The store rejects everything else.
    pub fn can_transition_to(&self, to: OutboxStatus) -> bool {
        use OutboxStatus::*;
        match (self, to) {
            (Pending, Enqueued) => true,
            // worker may see a PENDING row if the ingestion transaction
            // lost its tail; claiming it directly is legal
            (Pending, Processing) => true,
            (Enqueued, Processing) => true,
            (Processing, Sent) => true,
            (Processing, Failed) => true,
            (Processing, Retrying) => true,
            (Retrying, Processing) => true,
            // TTL expiry can fail a job that never got claimed again
            (Retrying, Failed) => true,
            (Enqueued, Failed) => true,
            (Pending, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Enqueued => "ENQUEUED",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
        }
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ENQUEUED" => Ok(Self::Enqueued),
            "PROCESSING" => Ok(Self::Processing),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "RETRYING" => Ok(Self::Retrying),
            other => Err(format!("unknown outbox status: {}", other)),
        }
    }
}

/// Sanitized HTML, either inline or behind a storage handle. The queue
/// envelope always carries the reference form for large bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyRef {
    Inline { html: String },
    Stored { key: String, size: usize },
}

impl BodyRef {
    pub fn size(&self) -> usize {
        match self {
            Self::Inline { html } => html.len(),
            Self::Stored { size, .. } => *size,
        }
    }
}

/// Attachment metadata persisted with the outbox (count + digest; the
/// bytes themselves ride the provider call only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    /// MD5 digest (hex) of the attachment content
    pub digest: String,
    /// Body-store key holding the content; the queue envelope never
    /// carries attachment bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailOutbox {
    /// Doubles as the job id
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Uuid>,
    pub to: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub from: String,
    pub subject: String,
    pub html_ref: BodyRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Safe-listed headers only
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    pub status: OutboxStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post-attempt record, one per dispatch attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: Uuid,
    pub outbox_id: Uuid,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub status: OutboxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<crate::error::ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}
