/// Dead-letter queue entries
use super::job::JobEnvelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub job_id: Uuid,
    pub outbox_id: Uuid,
    pub company_id: Uuid,
    pub original_payload: JobEnvelope,
    pub failed_attempts: u32,
    /// Mandatory, never blank
    pub last_failure_reason: String,
    pub last_failure_code: String,
    pub last_failure_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub moved_to_dlq_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DlqEntry {
    /// Builds an entry, enforcing the non-blank reason invariant and the
    /// stored-reason length bound.
    pub fn new(
        envelope: JobEnvelope,
        failed_attempts: u32,
        reason: &str,
        code: &str,
        ttl: std::time::Duration,
    ) -> Result<Self, crate::error::GatewayError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(crate::error::GatewayError::Validation(
                "DLQ entry requires a non-empty failure reason".to_string(),
            ));
        }
        let mut reason = reason.to_string();
        let mut cut = crate::constants::MAX_ERROR_REASON_LENGTH.min(reason.len());
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);

        let now = Utc::now();
        Ok(Self {
            job_id: envelope.job_id,
            outbox_id: envelope.job_id,
            company_id: envelope.company_id,
            enqueued_at: envelope.enqueued_at,
            original_payload: envelope,
            failed_attempts,
            last_failure_reason: reason,
            last_failure_code: code.to_string(),
            last_failure_at: now,
            moved_to_dlq_at: now,
            expires_at: now
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(7)),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
