/// Durable job queue
///
/// Delivery is at-least-once; consumer idempotency comes from the CAS
/// transition on the outbox row, not from the queue. The SQS
/// implementation maps retry delays to DelaySeconds and carries
/// company/priority/attempt as message attributes; the in-memory
/// implementation models priorities, delayed jobs, visibility leases and
/// a hard capacity bound (refuse writes, never evict).
use crate::constants::{JOB_LEASE_SECONDS, MAX_ENVELOPE_BYTES, QUEUE_CAPACITY};
use crate::error::GatewayError;
use crate::models::{JobEnvelope, QueuedJob};
use crate::utils::backoff::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Queue depth gauge; `prioritized` (jobs below the default priority) is
/// always reported, never folded into `waiting`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub waiting: usize,
    pub prioritized: usize,
    pub delayed: usize,
    pub active: usize,
}

impl QueueDepth {
    pub fn total(&self) -> usize {
        self.waiting + self.prioritized + self.delayed + self.active
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job, optionally delayed. `QueueFull` signals memory
    /// pressure and must surface as 503 at the ingestion edge.
    async fn enqueue(&self, envelope: &JobEnvelope, delay: Duration) -> Result<(), GatewayError>;

    /// Receives up to `max` jobs, each under a visibility lease
    async fn receive(&self, max: usize) -> Result<Vec<QueuedJob>, GatewayError>;

    /// Releases a processed job
    async fn ack(&self, receipt: &str) -> Result<(), GatewayError>;

    /// Extends the visibility lease of an in-flight job
    async fn extend_lease(&self, receipt: &str, duration: Duration) -> Result<(), GatewayError>;

    async fn depth(&self) -> Result<QueueDepth, GatewayError>;
}

fn check_envelope_size(envelope: &JobEnvelope) -> Result<Vec<u8>, GatewayError> {
    let bytes = serde_json::to_vec(envelope)
        .map_err(|e| GatewayError::Queue(format!("Envelope serialization failed: {}", e)))?;
    if bytes.len() > MAX_ENVELOPE_BYTES {
        return Err(GatewayError::Queue(format!(
            "Envelope exceeds {} bytes; HTML must ride as a reference",
            MAX_ENVELOPE_BYTES
        )));
    }
    Ok(bytes)
}

// ============================================================================
// SQS implementation
// ============================================================================

pub struct SqsJobQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsJobQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl JobQueue for SqsJobQueue {
    async fn enqueue(&self, envelope: &JobEnvelope, delay: Duration) -> Result<(), GatewayError> {
        use aws_sdk_sqs::types::MessageAttributeValue;

        let bytes = check_envelope_size(envelope)?;
        let body = String::from_utf8(bytes)
            .map_err(|e| GatewayError::Queue(format!("Envelope not UTF-8: {}", e)))?;

        let attr = |v: String| {
            MessageAttributeValue::builder()
                .data_type("String")
                .string_value(v)
                .build()
                .map_err(|e| GatewayError::Queue(format!("Bad message attribute: {}", e)))
        };
        let company_attr = attr(envelope.company_id.to_string())?;
        let priority_attr = attr(envelope.priority.to_string())?;
        let attempt_attr = attr(envelope.attempt.to_string())?;

        retry_with_backoff(
            || {
                let client = self.client.clone();
                let queue_url = self.queue_url.clone();
                let body = body.clone();
                let company_attr = company_attr.clone();
                let priority_attr = priority_attr.clone();
                let attempt_attr = attempt_attr.clone();

                async move {
                    client
                        .send_message()
                        .queue_url(queue_url)
                        .message_body(body)
                        .delay_seconds(delay.as_secs().min(900) as i32)
                        .message_attributes("companyId", company_attr)
                        .message_attributes("priority", priority_attr)
                        .message_attributes("attempt", attempt_attr)
                        .send()
                        .await
                        .map_err(|e| {
                            let text = e.to_string();
                            // refusal under pressure becomes QueueFull, which
                            // the ingestion edge turns into 503 + Retry-After
                            if text.contains("RequestThrottled") || text.contains("OverLimit") {
                                GatewayError::QueueFull(text)
                            } else {
                                GatewayError::Queue(format!("SQS send_message failed: {}", text))
                            }
                        })
                }
            },
            RetryConfig::new(3, 100, 2000),
            "sqs_send_message",
        )
        .await?;

        debug!(job_id = %envelope.job_id, delay_ms = delay.as_millis() as u64, "Enqueued job");
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueuedJob>, GatewayError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max.clamp(1, 10) as i32)
            .visibility_timeout(JOB_LEASE_SECONDS as i32)
            .wait_time_seconds(20)
            .send()
            .await
            .map_err(|e| GatewayError::Queue(format!("SQS receive_message failed: {}", e)))?;

        let mut jobs = Vec::new();
        for msg in response.messages() {
            let receipt = msg.receipt_handle().unwrap_or_default().to_string();
            let body = msg.body().unwrap_or_default();
            match serde_json::from_str::<JobEnvelope>(body) {
                Ok(envelope) => jobs.push(QueuedJob { envelope, receipt }),
                Err(e) => {
                    // a malformed envelope can never succeed; drop it from
                    // the queue so it doesn't loop forever
                    warn!(error = %e, "Dropping undecodable job envelope");
                    let _ = self
                        .client
                        .delete_message()
                        .queue_url(&self.queue_url)
                        .receipt_handle(&receipt)
                        .send()
                        .await;
                }
            }
        }
        Ok(jobs)
    }

    async fn ack(&self, receipt: &str) -> Result<(), GatewayError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| GatewayError::Queue(format!("SQS delete_message failed: {}", e)))?;
        Ok(())
    }

    async fn extend_lease(&self, receipt: &str, duration: Duration) -> Result<(), GatewayError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(duration.as_secs() as i32)
            .send()
            .await
            .map_err(|e| GatewayError::Queue(format!("SQS change_visibility failed: {}", e)))?;
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth, GatewayError> {
        use aws_sdk_sqs::types::QueueAttributeName;

        let response = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesDelayed)
            .send()
            .await
            .map_err(|e| GatewayError::Queue(format!("SQS get_queue_attributes failed: {}", e)))?;

        let get = |name: &QueueAttributeName| {
            response
                .attributes()
                .and_then(|m| m.get(name))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0)
        };

        Ok(QueueDepth {
            waiting: get(&QueueAttributeName::ApproximateNumberOfMessages),
            // SQS has no priority lanes; prioritized jobs live in `waiting`
            prioritized: 0,
            delayed: get(&QueueAttributeName::ApproximateNumberOfMessagesDelayed),
            active: get(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible),
        })
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

struct Leased {
    envelope: JobEnvelope,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct InMemoryState {
    waiting: Vec<JobEnvelope>,
    delayed: Vec<(DateTime<Utc>, JobEnvelope)>,
    leased: HashMap<String, Leased>,
}

pub struct InMemoryJobQueue {
    state: tokio::sync::Mutex<InMemoryState>,
    capacity: usize,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: tokio::sync::Mutex::new(InMemoryState::default()),
            capacity,
        }
    }

}

/// Interleaves a priority-sorted job list so no tenant holds the head
/// for more than `batch_cap` consecutive slots while others wait
fn interleave_by_tenant(sorted: Vec<JobEnvelope>, batch_cap: usize) -> Vec<JobEnvelope> {
    use std::collections::VecDeque;

    let mut order: Vec<uuid::Uuid> = Vec::new();
    let mut groups: HashMap<uuid::Uuid, VecDeque<JobEnvelope>> = HashMap::new();
    for job in sorted {
        if !groups.contains_key(&job.company_id) {
            order.push(job.company_id);
        }
        groups.entry(job.company_id).or_default().push_back(job);
    }

    let mut out = Vec::with_capacity(groups.values().map(|g| g.len()).sum());
    while !order.is_empty() {
        let mut still_pending = Vec::new();
        for company in order.drain(..) {
            let group = groups.get_mut(&company).expect("group exists");
            for _ in 0..batch_cap.max(1) {
                match group.pop_front() {
                    Some(job) => out.push(job),
                    None => break,
                }
            }
            if !group.is_empty() {
                still_pending.push(company);
            }
        }
        order = still_pending;
    }
    out
}

impl InMemoryJobQueue {
    /// Promote due delayed jobs and reclaim expired leases
    fn settle(state: &mut InMemoryState, now: DateTime<Utc>) {
        let mut still_delayed = Vec::new();
        for (ready_at, job) in state.delayed.drain(..) {
            if ready_at <= now {
                state.waiting.push(job);
            } else {
                still_delayed.push((ready_at, job));
            }
        }
        state.delayed = still_delayed;

        let expired: Vec<String> = state
            .leased
            .iter()
            .filter(|(_, l)| l.expires_at <= now)
            .map(|(r, _)| r.clone())
            .collect();
        for receipt in expired {
            if let Some(leased) = state.leased.remove(&receipt) {
                warn!(job_id = %leased.envelope.job_id, "Lease expired, job visible again");
                state.waiting.push(leased.envelope);
            }
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, envelope: &JobEnvelope, delay: Duration) -> Result<(), GatewayError> {
        check_envelope_size(envelope)?;
        let mut state = self.state.lock().await;
        let total = state.waiting.len() + state.delayed.len() + state.leased.len();
        if total >= self.capacity {
            return Err(GatewayError::QueueFull(format!(
                "Queue at capacity ({} jobs)",
                self.capacity
            )));
        }
        if delay.is_zero() {
            state.waiting.push(envelope.clone());
        } else {
            let ready_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
            state.delayed.push((ready_at, envelope.clone()));
        }
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueuedJob>, GatewayError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        Self::settle(&mut state, now);

        // numerically lower priority first, then oldest first
        state
            .waiting
            .sort_by(|a, b| (a.priority, a.enqueued_at).cmp(&(b.priority, b.enqueued_at)));

        // round-robin by tenant: at most MAX_JOBS_PER_TENANT_BATCH
        // consecutive jobs from one company before yielding to the next
        let interleaved = interleave_by_tenant(
            std::mem::take(&mut state.waiting),
            crate::constants::MAX_JOBS_PER_TENANT_BATCH as usize,
        );
        let take = max.min(interleaved.len());
        let mut iter = interleaved.into_iter();
        let mut jobs_out: Vec<JobEnvelope> = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(envelope) = iter.next() {
                jobs_out.push(envelope);
            }
        }
        state.waiting = iter.collect();

        let mut jobs = Vec::with_capacity(take);
        for envelope in jobs_out {
            let receipt = uuid::Uuid::new_v4().to_string();
            state.leased.insert(
                receipt.clone(),
                Leased {
                    envelope: envelope.clone(),
                    expires_at: now + chrono::Duration::seconds(JOB_LEASE_SECONDS as i64),
                },
            );
            jobs.push(QueuedJob { envelope, receipt });
        }
        Ok(jobs)
    }

    async fn ack(&self, receipt: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if state.leased.remove(receipt).is_none() {
            debug!(receipt = receipt, "Ack for unknown or expired lease");
        }
        Ok(())
    }

    async fn extend_lease(&self, receipt: &str, duration: Duration) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        match state.leased.get_mut(receipt) {
            Some(leased) => {
                leased.expires_at = Utc::now()
                    + chrono::Duration::from_std(duration)
                        .unwrap_or_else(|_| chrono::Duration::seconds(JOB_LEASE_SECONDS as i64));
                Ok(())
            }
            None => Err(GatewayError::Queue(format!(
                "No lease for receipt {}",
                receipt
            ))),
        }
    }

    async fn depth(&self) -> Result<QueueDepth, GatewayError> {
        let mut state = self.state.lock().await;
        Self::settle(&mut state, Utc::now());
        let prioritized = state
            .waiting
            .iter()
            .filter(|j| j.priority < crate::constants::DEFAULT_PRIORITY)
            .count();
        Ok(QueueDepth {
            waiting: state.waiting.len() - prioritized,
            prioritized,
            delayed: state.delayed.len(),
            active: state.leased.len(),
        })
    }
}
