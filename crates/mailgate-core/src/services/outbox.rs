/// Outbox store: authoritative state of every accepted send
///
/// All worker coordination happens through `update_status`, a CAS-style
/// transition: at most one worker owns an outbox row at a time, and
/// terminal states are sticky. Every successful transition is paired with
/// exactly one appended event.
use crate::error::GatewayError;
use crate::models::{EmailEvent, EmailLog, EmailOutbox, EventMetadata, EventType, OutboxStatus};
use crate::utils::pagination::{Cursor, PageInfo, PageRequest};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Fields written together with a status transition
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    pub attempts: Option<u32>,
    pub provider_message_id: Option<String>,
    pub recipient_id: Option<Uuid>,
}

/// Operator listing filters (GET /v1/emails)
#[derive(Debug, Clone, Default)]
pub struct OutboxFilter {
    pub company_id: Option<Uuid>,
    pub statuses: Vec<OutboxStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub to: Option<String>,
    /// Already-resolved recipient ids (externalId / hashed cpfCnpj / name
    /// filters resolve to recipients before the listing runs)
    pub recipient_ids: Vec<Uuid>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxPage {
    pub rows: Vec<EmailOutbox>,
    pub pagination: PageInfo,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn insert(&self, row: &EmailOutbox) -> Result<(), GatewayError>;

    async fn get(&self, id: Uuid) -> Result<Option<EmailOutbox>, GatewayError>;

    /// Transitions `id` from one of `from` to `to`, applying `fields`.
    /// Returns false when the row is not currently in any `from` state
    /// (another worker won the claim, or the row is terminal).
    async fn update_status(
        &self,
        id: Uuid,
        from: &[OutboxStatus],
        to: OutboxStatus,
        fields: StatusFields,
    ) -> Result<bool, GatewayError>;

    /// Appends to the ordered, append-only event stream
    async fn append_event(
        &self,
        outbox_id: Uuid,
        event_type: EventType,
        metadata: EventMetadata,
    ) -> Result<EmailEvent, GatewayError>;

    async fn events(&self, outbox_id: Uuid) -> Result<Vec<EmailEvent>, GatewayError>;

    async fn append_log(&self, log: &EmailLog) -> Result<(), GatewayError>;

    async fn logs(&self, outbox_id: Uuid) -> Result<Vec<EmailLog>, GatewayError>;

    async fn list(
        &self,
        filter: &OutboxFilter,
        page: &PageRequest,
    ) -> Result<OutboxPage, GatewayError>;

    /// Rows stuck in PENDING longer than `older_than` (enqueue never
    /// completed); consumed by the sweeper
    async fn stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailOutbox>, GatewayError>;

    /// Operator-level override used only by the DLQ replay tool: moves a
    /// FAILED row back to RETRYING with attempts reset. Pipeline code
    /// never calls this; terminal stickiness holds everywhere else.
    async fn reopen(&self, id: Uuid) -> Result<bool, GatewayError>;

    /// Retention pass: strips PII (addresses, subject, body reference)
    /// from settled rows older than `cutoff`, keeping ids, status and the
    /// event trail. Returns how many rows were pseudonymized.
    async fn pseudonymize_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, GatewayError>;
}

/// Redacts the PII-bearing fields of a settled row in place
fn pseudonymize_row(row: &mut EmailOutbox) {
    row.to = crate::utils::redact::redact_email(&row.to);
    row.cc = row
        .cc
        .iter()
        .map(|a| crate::utils::redact::redact_email(a))
        .collect();
    row.bcc = row
        .bcc
        .iter()
        .map(|a| crate::utils::redact::redact_email(a))
        .collect();
    row.subject = "[redacted]".to_string();
    row.html_ref = crate::models::BodyRef::Inline {
        html: String::new(),
    };
    row.headers.clear();
    row.attachments.clear();
    row.updated_at = Utc::now();
}

fn retention_eligible(row: &EmailOutbox, cutoff: DateTime<Utc>) -> bool {
    row.status.is_terminal() && row.created_at < cutoff && row.subject != "[redacted]"
}

/// Process-wide monotonic sequence; combined with the server clock it
/// totally orders events for a row (one writer owns a row at a time)
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    EVENT_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

fn matches_filter(row: &EmailOutbox, filter: &OutboxFilter) -> bool {
    if let Some(company_id) = filter.company_id
        && row.company_id != company_id
    {
        return false;
    }
    if !filter.statuses.is_empty() && !filter.statuses.contains(&row.status) {
        return false;
    }
    if let Some(from) = filter.date_from
        && row.created_at < from
    {
        return false;
    }
    if let Some(to) = filter.date_to
        && row.created_at > to
    {
        return false;
    }
    if let Some(addr) = &filter.to
        && !row.to.eq_ignore_ascii_case(addr)
    {
        return false;
    }
    if !filter.recipient_ids.is_empty()
        && !row
            .recipient_id
            .map(|id| filter.recipient_ids.contains(&id))
            .unwrap_or(false)
    {
        return false;
    }
    if !filter.tags.is_empty() && !filter.tags.iter().any(|t| row.tags.contains(t)) {
        return false;
    }
    true
}

// ============================================================================
// DynamoDB implementation
// ============================================================================

/// Rows are stored as a JSON `payload` plus indexed scalars (id,
/// company_id, status, created_at); events and logs live in their own
/// tables keyed by outbox id.
pub struct DynamoDbOutboxStore {
    client: aws_sdk_dynamodb::Client,
    outbox_table: String,
    events_table: String,
    logs_table: String,
}

impl DynamoDbOutboxStore {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        outbox_table: String,
        events_table: String,
        logs_table: String,
    ) -> Self {
        Self {
            client,
            outbox_table,
            events_table,
            logs_table,
        }
    }

    fn row_item(row: &EmailOutbox) -> Result<HashMap<String, AttributeValue>, GatewayError> {
        let payload = serde_json::to_string(row)
            .map_err(|e| GatewayError::Storage(format!("Outbox serialization failed: {}", e)))?;
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S(row.id.to_string()));
        item.insert(
            "company_id".to_string(),
            AttributeValue::S(row.company_id.to_string()),
        );
        item.insert(
            "status".to_string(),
            AttributeValue::S(row.status.as_str().to_string()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(row.created_at.to_rfc3339()),
        );
        item.insert("payload".to_string(), AttributeValue::S(payload));
        Ok(item)
    }

    fn row_from_item(item: &HashMap<String, AttributeValue>) -> Result<EmailOutbox, GatewayError> {
        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| GatewayError::Storage("Outbox item missing payload".to_string()))?;
        serde_json::from_str(payload)
            .map_err(|e| GatewayError::Storage(format!("Outbox deserialization failed: {}", e)))
    }
}

#[async_trait]
impl OutboxStore for DynamoDbOutboxStore {
    async fn insert(&self, row: &EmailOutbox) -> Result<(), GatewayError> {
        self.client
            .put_item()
            .table_name(&self.outbox_table)
            .set_item(Some(Self::row_item(row)?))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Outbox insert failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmailOutbox>, GatewayError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.outbox_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Outbox get failed: {}", e)))?;

        result.item().map(Self::row_from_item).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: &[OutboxStatus],
        to: OutboxStatus,
        fields: StatusFields,
    ) -> Result<bool, GatewayError> {
        // the legal-transition check runs locally; the condition
        // expression guarantees it atomically against the stored state
        let current = match self.get(id).await? {
            Some(row) => row,
            None => return Err(GatewayError::OutboxNotFound(id.to_string())),
        };
        if !from.contains(&current.status) || !current.status.can_transition_to(to) {
            return Ok(false);
        }

        let mut updated = current.clone();
        updated.status = to;
        updated.updated_at = Utc::now();
        if let Some(attempts) = fields.attempts {
            updated.attempts = attempts;
        }
        if let Some(mid) = fields.provider_message_id {
            updated.provider_message_id = Some(mid);
        }
        if let Some(rid) = fields.recipient_id {
            updated.recipient_id = Some(rid);
        }

        let payload = serde_json::to_string(&updated)
            .map_err(|e| GatewayError::Storage(format!("Outbox serialization failed: {}", e)))?;

        let mut names = HashMap::new();
        names.insert("#s".to_string(), "status".to_string());
        let mut values = HashMap::new();
        values.insert(
            ":new_status".to_string(),
            AttributeValue::S(to.as_str().to_string()),
        );
        values.insert(":payload".to_string(), AttributeValue::S(payload));
        let mut conditions = Vec::new();
        for (i, state) in from.iter().enumerate() {
            let key = format!(":from{}", i);
            values.insert(key.clone(), AttributeValue::S(state.as_str().to_string()));
            conditions.push(format!("#s = {}", key));
        }

        let result = self
            .client
            .update_item()
            .table_name(&self.outbox_table)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression("SET #s = :new_status, payload = :payload")
            .condition_expression(conditions.join(" OR "))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let lost_cas = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if lost_cas {
                    Ok(false)
                } else {
                    Err(GatewayError::Storage(format!(
                        "Outbox transition failed: {}",
                        e
                    )))
                }
            }
        }
    }

    async fn append_event(
        &self,
        outbox_id: Uuid,
        event_type: EventType,
        metadata: EventMetadata,
    ) -> Result<EmailEvent, GatewayError> {
        let event = EmailEvent {
            id: Uuid::new_v4(),
            outbox_id,
            event_type,
            occurred_at: Utc::now(),
            sequence: next_sequence(),
            metadata,
        };
        let payload = serde_json::to_string(&event)
            .map_err(|e| GatewayError::Storage(format!("Event serialization failed: {}", e)))?;

        self.client
            .put_item()
            .table_name(&self.events_table)
            .item("outbox_id", AttributeValue::S(outbox_id.to_string()))
            .item(
                "sort_key",
                AttributeValue::S(format!(
                    "{}#{:020}",
                    event.occurred_at.to_rfc3339(),
                    event.sequence
                )),
            )
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Event append failed: {}", e)))?;

        Ok(event)
    }

    async fn events(&self, outbox_id: Uuid) -> Result<Vec<EmailEvent>, GatewayError> {
        let result = self
            .client
            .query()
            .table_name(&self.events_table)
            .key_condition_expression("outbox_id = :oid")
            .expression_attribute_values(":oid", AttributeValue::S(outbox_id.to_string()))
            .scan_index_forward(true)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Event query failed: {}", e)))?;

        result
            .items()
            .iter()
            .map(|item| {
                let payload = item
                    .get("payload")
                    .and_then(|v| v.as_s().ok())
                    .ok_or_else(|| GatewayError::Storage("Event missing payload".to_string()))?;
                serde_json::from_str(payload).map_err(|e| {
                    GatewayError::Storage(format!("Event deserialization failed: {}", e))
                })
            })
            .collect()
    }

    async fn append_log(&self, log: &EmailLog) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(log)
            .map_err(|e| GatewayError::Storage(format!("Log serialization failed: {}", e)))?;
        self.client
            .put_item()
            .table_name(&self.logs_table)
            .item("outbox_id", AttributeValue::S(log.outbox_id.to_string()))
            .item(
                "sort_key",
                AttributeValue::S(format!("{:010}", log.attempt)),
            )
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Log append failed: {}", e)))?;
        Ok(())
    }

    async fn logs(&self, outbox_id: Uuid) -> Result<Vec<EmailLog>, GatewayError> {
        let result = self
            .client
            .query()
            .table_name(&self.logs_table)
            .key_condition_expression("outbox_id = :oid")
            .expression_attribute_values(":oid", AttributeValue::S(outbox_id.to_string()))
            .scan_index_forward(true)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Log query failed: {}", e)))?;

        result
            .items()
            .iter()
            .map(|item| {
                let payload = item
                    .get("payload")
                    .and_then(|v| v.as_s().ok())
                    .ok_or_else(|| GatewayError::Storage("Log missing payload".to_string()))?;
                serde_json::from_str(payload)
                    .map_err(|e| GatewayError::Storage(format!("Log deserialization failed: {}", e)))
            })
            .collect()
    }

    async fn list(
        &self,
        filter: &OutboxFilter,
        page: &PageRequest,
    ) -> Result<OutboxPage, GatewayError> {
        // operator listing; a filtered scan is acceptable at this volume
        let result = self
            .client
            .scan()
            .table_name(&self.outbox_table)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Outbox scan failed: {}", e)))?;

        let mut rows: Vec<EmailOutbox> = result
            .items()
            .iter()
            .map(Self::row_from_item)
            .collect::<Result<_, _>>()?;
        rows.retain(|r| matches_filter(r, filter));
        Ok(paginate(rows, page))
    }

    async fn stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailOutbox>, GatewayError> {
        let result = self
            .client
            .scan()
            .table_name(&self.outbox_table)
            .filter_expression("#s = :pending AND created_at < :cutoff")
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(":pending", AttributeValue::S("PENDING".to_string()))
            .expression_attribute_values(":cutoff", AttributeValue::S(older_than.to_rfc3339()))
            .limit(limit as i32)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Stale-pending scan failed: {}", e)))?;

        result.items().iter().map(Self::row_from_item).collect()
    }

    async fn reopen(&self, id: Uuid) -> Result<bool, GatewayError> {
        let current = match self.get(id).await? {
            Some(row) => row,
            None => return Err(GatewayError::OutboxNotFound(id.to_string())),
        };
        if current.status != OutboxStatus::Failed {
            return Ok(false);
        }

        let mut updated = current;
        updated.status = OutboxStatus::Retrying;
        updated.attempts = 0;
        updated.updated_at = Utc::now();
        let payload = serde_json::to_string(&updated)
            .map_err(|e| GatewayError::Storage(format!("Outbox serialization failed: {}", e)))?;

        let result = self
            .client
            .update_item()
            .table_name(&self.outbox_table)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression("SET #s = :new_status, payload = :payload")
            .condition_expression("#s = :failed")
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(
                ":new_status",
                AttributeValue::S(OutboxStatus::Retrying.as_str().to_string()),
            )
            .expression_attribute_values(
                ":failed",
                AttributeValue::S(OutboxStatus::Failed.as_str().to_string()),
            )
            .expression_attribute_values(":payload", AttributeValue::S(payload))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let lost_cas = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if lost_cas {
                    Ok(false)
                } else {
                    Err(GatewayError::Storage(format!("Outbox reopen failed: {}", e)))
                }
            }
        }
    }

    async fn pseudonymize_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, GatewayError> {
        let result = self
            .client
            .scan()
            .table_name(&self.outbox_table)
            .filter_expression("created_at < :cutoff")
            .expression_attribute_values(":cutoff", AttributeValue::S(cutoff.to_rfc3339()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Retention scan failed: {}", e)))?;

        let mut count = 0usize;
        for item in result.items() {
            if count >= limit {
                break;
            }
            let mut row = Self::row_from_item(item)?;
            if !retention_eligible(&row, cutoff) {
                continue;
            }
            pseudonymize_row(&mut row);
            let payload = serde_json::to_string(&row).map_err(|e| {
                GatewayError::Storage(format!("Outbox serialization failed: {}", e))
            })?;
            self.client
                .update_item()
                .table_name(&self.outbox_table)
                .key("id", AttributeValue::S(row.id.to_string()))
                .update_expression("SET payload = :payload")
                .expression_attribute_values(":payload", AttributeValue::S(payload))
                .send()
                .await
                .map_err(|e| {
                    GatewayError::Storage(format!("Retention rewrite failed: {}", e))
                })?;
            count += 1;
        }
        Ok(count)
    }
}

/// Shared newest-first pagination over an already-filtered row set
fn paginate(mut rows: Vec<EmailOutbox>, page: &PageRequest) -> OutboxPage {
    rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
    let total = rows.len();

    let start = match (&page.cursor, page.offset) {
        (Some(cursor), _) => rows
            .iter()
            .position(|r| (r.created_at, r.id) < (cursor.created_at, cursor.id))
            .unwrap_or(total),
        (None, Some(offset)) => offset.min(total),
        (None, None) => 0,
    };

    let end = (start + page.page_size).min(total);
    let slice: Vec<EmailOutbox> = rows[start..end].to_vec();
    let has_more = end < total;
    let next_cursor = if has_more {
        slice.last().map(|r| {
            Cursor {
                created_at: r.created_at,
                id: r.id,
            }
            .encode()
        })
    } else {
        None
    };

    OutboxPage {
        rows: slice,
        pagination: PageInfo {
            page_size: page.page_size,
            offset: page.offset,
            next_cursor,
            total: Some(total),
            has_more,
        },
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

#[derive(Default)]
struct InMemoryOutboxState {
    rows: HashMap<Uuid, EmailOutbox>,
    events: Vec<EmailEvent>,
    logs: Vec<EmailLog>,
}

#[derive(Default)]
pub struct InMemoryOutboxStore {
    state: tokio::sync::Mutex<InMemoryOutboxState>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, row: &EmailOutbox) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if state.rows.contains_key(&row.id) {
            return Err(GatewayError::Storage(format!(
                "Outbox {} already exists",
                row.id
            )));
        }
        state.rows.insert(row.id, row.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<EmailOutbox>, GatewayError> {
        Ok(self.state.lock().await.rows.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: &[OutboxStatus],
        to: OutboxStatus,
        fields: StatusFields,
    ) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .get_mut(&id)
            .ok_or_else(|| GatewayError::OutboxNotFound(id.to_string()))?;

        if !from.contains(&row.status) || !row.status.can_transition_to(to) {
            return Ok(false);
        }
        row.status = to;
        row.updated_at = Utc::now();
        if let Some(attempts) = fields.attempts {
            row.attempts = attempts;
        }
        if let Some(mid) = fields.provider_message_id {
            row.provider_message_id = Some(mid);
        }
        if let Some(rid) = fields.recipient_id {
            row.recipient_id = Some(rid);
        }
        Ok(true)
    }

    async fn append_event(
        &self,
        outbox_id: Uuid,
        event_type: EventType,
        metadata: EventMetadata,
    ) -> Result<EmailEvent, GatewayError> {
        let event = EmailEvent {
            id: Uuid::new_v4(),
            outbox_id,
            event_type,
            occurred_at: Utc::now(),
            sequence: next_sequence(),
            metadata,
        };
        self.state.lock().await.events.push(event.clone());
        Ok(event)
    }

    async fn events(&self, outbox_id: Uuid) -> Result<Vec<EmailEvent>, GatewayError> {
        let state = self.state.lock().await;
        let mut events: Vec<EmailEvent> = state
            .events
            .iter()
            .filter(|e| e.outbox_id == outbox_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn append_log(&self, log: &EmailLog) -> Result<(), GatewayError> {
        self.state.lock().await.logs.push(log.clone());
        Ok(())
    }

    async fn logs(&self, outbox_id: Uuid) -> Result<Vec<EmailLog>, GatewayError> {
        let state = self.state.lock().await;
        let mut logs: Vec<EmailLog> = state
            .logs
            .iter()
            .filter(|l| l.outbox_id == outbox_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.attempt);
        Ok(logs)
    }

    async fn list(
        &self,
        filter: &OutboxFilter,
        page: &PageRequest,
    ) -> Result<OutboxPage, GatewayError> {
        let state = self.state.lock().await;
        let rows: Vec<EmailOutbox> = state
            .rows
            .values()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailOutbox>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|r| r.status == OutboxStatus::Pending && r.created_at < older_than)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn reopen(&self, id: Uuid) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .get_mut(&id)
            .ok_or_else(|| GatewayError::OutboxNotFound(id.to_string()))?;
        if row.status != OutboxStatus::Failed {
            return Ok(false);
        }
        row.status = OutboxStatus::Retrying;
        row.attempts = 0;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn pseudonymize_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, GatewayError> {
        let mut state = self.state.lock().await;
        let mut count = 0usize;
        for row in state.rows.values_mut() {
            if count >= limit {
                break;
            }
            if retention_eligible(row, cutoff) {
                pseudonymize_row(row);
                count += 1;
            }
        }
        Ok(count)
    }
}
