/// Per-tenant fairness bookkeeping (in-memory, per worker process)
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantFairness {
    pub company_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<DateTime<Utc>>,
    pub rounds_without_processing: u32,
    /// 1 = most urgent .. 10 = least
    pub current_priority: u8,
    pub total_processed: u64,
    pub consecutive_batch_count: u32,
}

impl TenantFairness {
    pub fn new(company_id: Uuid) -> Self {
        Self {
            company_id,
            last_processed_at: None,
            rounds_without_processing: 0,
            current_priority: crate::constants::DEFAULT_PRIORITY,
            total_processed: 0,
            consecutive_batch_count: 0,
        }
    }

    /// Starved tenants get numerically lower (more urgent) priority:
    /// priority = max(1, base − rounds)
    pub fn derive_priority(&self, base: u8) -> u8 {
        let rounds = self.rounds_without_processing.min(u8::MAX as u32) as u8;
        base.saturating_sub(rounds).max(crate::constants::MIN_PRIORITY)
    }

    /// Called when one of this tenant's jobs is processed
    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.last_processed_at = Some(now);
        self.rounds_without_processing = 0;
        self.consecutive_batch_count = 0;
        self.total_processed += 1;
        self.current_priority = crate::constants::DEFAULT_PRIORITY;
    }

    /// Called when a round passes this tenant over
    pub fn mark_skipped(&mut self) {
        self.rounds_without_processing += 1;
        self.current_priority = self.derive_priority(crate::constants::DEFAULT_PRIORITY);
    }
}
