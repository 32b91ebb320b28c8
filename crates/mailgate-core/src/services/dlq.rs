/// Dead-letter queue store
///
/// Entries are capped; overflow is archived externally (S3), never
/// silently dropped. Every entry carries a non-empty failure reason,
/// enforced at construction by `DlqEntry::new`.
use crate::constants::DLQ_MAX_ENTRIES;
use crate::error::GatewayError;
use crate::models::DlqEntry;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use std::collections::VecDeque;
use tracing::{info, warn};
use uuid::Uuid;

/// Filters for the replay tool and the admin listing
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub job_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub error_code: Option<String>,
}

impl DlqFilter {
    fn matches(&self, entry: &DlqEntry) -> bool {
        if let Some(job_id) = self.job_id
            && entry.job_id != job_id
        {
            return false;
        }
        if let Some(company_id) = self.company_id
            && entry.company_id != company_id
        {
            return false;
        }
        if let Some(code) = &self.error_code
            && &entry.last_failure_code != code
        {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait DlqStore: Send + Sync {
    async fn push(&self, entry: DlqEntry) -> Result<(), GatewayError>;

    async fn list(&self, filter: &DlqFilter, limit: usize) -> Result<Vec<DlqEntry>, GatewayError>;

    /// Removes an entry after a successful replay
    async fn remove(&self, job_id: Uuid) -> Result<(), GatewayError>;

    /// Deletes entries past their TTL; returns how many were pruned
    async fn prune_expired(&self) -> Result<usize, GatewayError>;

    async fn depth(&self) -> Result<usize, GatewayError>;
}

// ============================================================================
// DynamoDB + S3 archive implementation
// ============================================================================

pub struct DynamoDbDlqStore {
    client: aws_sdk_dynamodb::Client,
    s3: aws_sdk_s3::Client,
    table_name: String,
    archive_bucket: Option<String>,
    max_entries: usize,
}

impl DynamoDbDlqStore {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        s3: aws_sdk_s3::Client,
        table_name: String,
        archive_bucket: Option<String>,
    ) -> Self {
        Self {
            client,
            s3,
            table_name,
            archive_bucket,
            max_entries: DLQ_MAX_ENTRIES,
        }
    }

    async fn scan_all(&self) -> Result<Vec<DlqEntry>, GatewayError> {
        let result = self
            .client
            .scan()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("DLQ scan failed: {}", e)))?;

        result
            .items()
            .iter()
            .map(|item| {
                let payload = item
                    .get("payload")
                    .and_then(|v| v.as_s().ok())
                    .ok_or_else(|| GatewayError::Storage("DLQ item missing payload".to_string()))?;
                serde_json::from_str(payload)
                    .map_err(|e| GatewayError::Storage(format!("DLQ deserialization failed: {}", e)))
            })
            .collect()
    }

    async fn archive(&self, entry: &DlqEntry) -> Result<(), GatewayError> {
        let Some(bucket) = &self.archive_bucket else {
            warn!(job_id = %entry.job_id, "No archive bucket configured; oldest DLQ entry kept");
            return Ok(());
        };
        let body = serde_json::to_vec(entry)
            .map_err(|e| GatewayError::Storage(format!("DLQ serialization failed: {}", e)))?;
        self.s3
            .put_object()
            .bucket(bucket)
            .key(format!("dlq-archive/{}.json", entry.job_id))
            .body(body.into())
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("DLQ archive failed: {}", e)))?;
        info!(job_id = %entry.job_id, "Archived DLQ overflow entry");
        Ok(())
    }
}

#[async_trait]
impl DlqStore for DynamoDbDlqStore {
    async fn push(&self, entry: DlqEntry) -> Result<(), GatewayError> {
        let mut all = self.scan_all().await?;
        if all.len() >= self.max_entries {
            all.sort_by_key(|e| e.moved_to_dlq_at);
            if let Some(oldest) = all.first() {
                self.archive(oldest).await?;
                self.remove(oldest.job_id).await?;
            }
        }

        let payload = serde_json::to_string(&entry)
            .map_err(|e| GatewayError::Storage(format!("DLQ serialization failed: {}", e)))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("job_id", AttributeValue::S(entry.job_id.to_string()))
            .item(
                "ttl",
                AttributeValue::N(entry.expires_at.timestamp().to_string()),
            )
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("DLQ put failed: {}", e)))?;
        Ok(())
    }

    async fn list(&self, filter: &DlqFilter, limit: usize) -> Result<Vec<DlqEntry>, GatewayError> {
        let mut entries = self.scan_all().await?;
        entries.retain(|e| filter.matches(e));
        entries.sort_by_key(|e| e.moved_to_dlq_at);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), GatewayError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("job_id", AttributeValue::S(job_id.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("DLQ delete failed: {}", e)))?;
        Ok(())
    }

    async fn prune_expired(&self) -> Result<usize, GatewayError> {
        // DynamoDB TTL expires items natively; this sweeps stragglers
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .scan_all()
            .await?
            .into_iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.job_id)
            .collect();
        for job_id in &expired {
            self.remove(*job_id).await?;
        }
        Ok(expired.len())
    }

    async fn depth(&self) -> Result<usize, GatewayError> {
        Ok(self.scan_all().await?.len())
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

pub struct InMemoryDlqStore {
    entries: tokio::sync::Mutex<VecDeque<DlqEntry>>,
    /// Overflow archive stand-in; inspected by tests
    archived: tokio::sync::Mutex<Vec<DlqEntry>>,
    max_entries: usize,
}

impl InMemoryDlqStore {
    pub fn new() -> Self {
        Self::with_capacity(DLQ_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: tokio::sync::Mutex::new(VecDeque::new()),
            archived: tokio::sync::Mutex::new(Vec::new()),
            max_entries,
        }
    }

    pub async fn archived_count(&self) -> usize {
        self.archived.lock().await.len()
    }
}

impl Default for InMemoryDlqStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DlqStore for InMemoryDlqStore {
    async fn push(&self, entry: DlqEntry) -> Result<(), GatewayError> {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_entries
            && let Some(oldest) = entries.pop_front()
        {
            self.archived.lock().await.push(oldest);
        }
        entries.push_back(entry);
        Ok(())
    }

    async fn list(&self, filter: &DlqFilter, limit: usize) -> Result<Vec<DlqEntry>, GatewayError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), GatewayError> {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.job_id != job_id);
        Ok(())
    }

    async fn prune_expired(&self) -> Result<usize, GatewayError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        Ok(before - entries.len())
    }

    async fn depth(&self) -> Result<usize, GatewayError> {
        Ok(self.entries.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BodyRef, JobEnvelope};
    use std::time::Duration;

    fn entry(code: &str) -> DlqEntry {
        let envelope = JobEnvelope {
            version: "1.0".into(),
            job_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            request_id: "req".into(),
            attempt: 5,
            priority: 5,
            enqueued_at: Utc::now(),
            from: "a@b.com".into(),
            to: "c@d.com".into(),
            cc: vec![],
            bcc: vec![],
            subject: "s".into(),
            html_ref: BodyRef::Inline {
                html: "<p>x</p>".into(),
            },
            reply_to: None,
            headers: vec![],
            tags: vec![],
            recipient: Default::default(),
        };
        DlqEntry::new(
            envelope,
            5,
            "Provider timeout",
            code,
            Duration::from_secs(7 * 24 * 60 * 60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_push_and_filter() {
        let store = InMemoryDlqStore::new();
        store.push(entry("PROVIDER_TIMEOUT")).await.unwrap();
        store.push(entry("PROVIDER_TIMEOUT")).await.unwrap();
        store.push(entry("NETWORK_ERROR")).await.unwrap();

        assert_eq!(store.depth().await.unwrap(), 3);
        let filter = DlqFilter {
            error_code: Some("PROVIDER_TIMEOUT".into()),
            ..Default::default()
        };
        assert_eq!(store.list(&filter, 100).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cap_archives_oldest() {
        let store = InMemoryDlqStore::with_capacity(2);
        let first = entry("A");
        let first_id = first.job_id;
        store.push(first).await.unwrap();
        store.push(entry("B")).await.unwrap();
        store.push(entry("C")).await.unwrap();

        assert_eq!(store.depth().await.unwrap(), 2);
        assert_eq!(store.archived_count().await, 1);
        // the archived one is gone from the active set
        let remaining = store.list(&DlqFilter::default(), 100).await.unwrap();
        assert!(remaining.iter().all(|e| e.job_id != first_id));
    }

    #[tokio::test]
    async fn test_remove_by_job_id() {
        let store = InMemoryDlqStore::new();
        let e = entry("A");
        let id = e.job_id;
        store.push(e).await.unwrap();
        store.remove(id).await.unwrap();
        assert_eq!(store.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let store = InMemoryDlqStore::new();
        let mut expired = entry("A");
        expired.expires_at = Utc::now() - chrono::Duration::hours(1);
        store.push(expired).await.unwrap();
        store.push(entry("B")).await.unwrap();

        assert_eq!(store.prune_expired().await.unwrap(), 1);
        assert_eq!(store.depth().await.unwrap(), 1);
    }
}
