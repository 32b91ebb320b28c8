/// Queue wire format
///
/// The envelope is a lightweight snapshot of dispatch-critical fields;
/// HTML rides as a reference, never inlined when large, and the whole
/// envelope must stay well under 64 KiB. Unknown fields are ignored on
/// deserialize so newer producers don't break older consumers.
use super::outbox::BodyRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient identifier block: ids only, no plaintext PII beyond the
/// to-address already in the dispatch snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_hash: Option<String>,
}

impl RecipientRef {
    pub fn is_empty(&self) -> bool {
        self.recipient_id.is_none() && self.external_id.is_none() && self.fiscal_hash.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(default = "default_version")]
    pub version: String,
    /// Always equals the outbox id
    pub job_id: Uuid,
    pub company_id: Uuid,
    pub request_id: String,
    pub attempt: u32,
    pub priority: u8,
    pub enqueued_at: DateTime<Utc>,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_ref: BodyRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "RecipientRef::is_empty")]
    pub recipient: RecipientRef,
}

fn default_version() -> String {
    crate::constants::ENVELOPE_VERSION.to_string()
}

impl JobEnvelope {
    /// Whether the job outlived its TTL and belongs in the DLQ
    pub fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.enqueued_at)
            > chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    /// Snapshot of an outbox row's dispatch-critical fields. Large HTML
    /// stays behind its storage handle.
    pub fn from_outbox(row: &crate::models::EmailOutbox, attempt: u32, priority: u8) -> Self {
        Self {
            version: default_version(),
            job_id: row.id,
            company_id: row.company_id,
            request_id: row.request_id.clone(),
            attempt,
            priority,
            enqueued_at: Utc::now(),
            from: row.from.clone(),
            to: row.to.clone(),
            cc: row.cc.clone(),
            bcc: row.bcc.clone(),
            subject: row.subject.clone(),
            html_ref: row.html_ref.clone(),
            reply_to: row.reply_to.clone(),
            headers: row.headers.clone(),
            tags: row.tags.clone(),
            recipient: RecipientRef {
                recipient_id: row.recipient_id,
                external_id: None,
                fiscal_hash: None,
            },
        }
    }
}

/// A received job plus the queue receipt needed to ack or extend it
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub envelope: JobEnvelope,
    pub receipt: String,
}
