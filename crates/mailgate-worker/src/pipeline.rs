/// Per-job pipeline state machine
///
/// RECEIVED → VALIDATED → SENT_ATTEMPT → {SENT | FAILED | RETRY_SCHEDULED}
///
/// Claiming is a CAS on the outbox row, so at-least-once queue delivery
/// collapses to at-most-one user-visible send. Every attempt leaves an
/// email log; every transition leaves exactly one event.
use crate::context::WorkerContext;
use chrono::Utc;
use mailgate_core::constants::{MAX_HTML_BYTES, VALIDATE_TIMEOUT_SECONDS};
use mailgate_core::error::{ErrorCategory, GatewayError};
use mailgate_core::models::{
    DlqEntry, EmailLog, EmailOutbox, EventMetadata, EventType, JobEnvelope, OutboxStatus,
    QueuedJob, Recipient,
};
use mailgate_core::providers::RenderedEmail;
use mailgate_core::services::body_store::BodyStore as _;
use mailgate_core::services::companies::CompanyStore as _;
use mailgate_core::services::dlq::DlqStore as _;
use mailgate_core::services::domains::DomainStore as _;
use mailgate_core::services::metrics::Metrics;
use mailgate_core::services::outbox::{OutboxStore as _, StatusFields};
use mailgate_core::services::queue::JobQueue as _;
use mailgate_core::services::recipients::{RecipientLookup, RecipientStore as _};
use mailgate_core::services::suppression::SuppressionList as _;
use mailgate_core::utils::backoff::RetryConfig;
use mailgate_core::utils::redact::redact_email;
use mailgate_core::utils::validation;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// States a worker may claim from
const CLAIMABLE: &[OutboxStatus] = &[
    OutboxStatus::Enqueued,
    OutboxStatus::Retrying,
    OutboxStatus::Pending,
];

/// What the caller should do with the queue slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Sent,
    Failed,
    RetryScheduled,
    /// Another worker owns the job, or it was already settled
    AlreadyClaimed,
    DlqPromoted,
}

#[tracing::instrument(
    name = "pipeline.process_job",
    skip(ctx, job),
    fields(job_id = %job.envelope.job_id, attempt = job.envelope.attempt)
)]
pub async fn process_job(
    ctx: &WorkerContext,
    job: &QueuedJob,
    tenant_priority: u8,
) -> Result<JobOutcome, GatewayError> {
    let envelope = &job.envelope;
    let attempt = envelope.attempt.max(1);

    // TTL expiry beats everything else: the job goes to the DLQ
    if envelope.is_expired(ctx.queue_config.job_ttl, Utc::now()) {
        return expire_job(ctx, envelope).await;
    }

    // 1. Claim: CAS {ENQUEUED, RETRYING, PENDING} → PROCESSING. Losing
    //    the race means another worker owns the job; ack without
    //    side-effects.
    let claimed = ctx
        .outbox
        .update_status(
            envelope.job_id,
            CLAIMABLE,
            OutboxStatus::Processing,
            StatusFields {
                attempts: Some(attempt),
                ..Default::default()
            },
        )
        .await;
    match claimed {
        Ok(true) => {}
        Ok(false) => {
            info!(job_id = %envelope.job_id, "Claim lost, job already owned or settled");
            return Ok(JobOutcome::AlreadyClaimed);
        }
        Err(GatewayError::OutboxNotFound(_)) => {
            // an accepted request always has an outbox row; a missing row
            // is unrecoverable and must not loop through the queue
            warn!(job_id = %envelope.job_id, "No outbox row for job");
            return dead_end(ctx, envelope, attempt, GatewayError::OutboxNotFound(
                envelope.job_id.to_string(),
            ))
            .await;
        }
        Err(e) => return Err(e),
    }
    ctx.outbox
        .append_event(
            envelope.job_id,
            EventType::Processing,
            EventMetadata::Processing {
                attempt,
                worker_id: ctx.worker_id.clone(),
            },
        )
        .await?;

    Metrics::queue_wait(
        ctx.metrics.as_ref(),
        (Utc::now() - envelope.enqueued_at).num_milliseconds().max(0) as f64,
    )
    .await;

    // 2. Validate (bounded): storage hiccups inside validation stay
    //    retryable; shape violations are permanent.
    let validated = tokio::time::timeout(
        Duration::from_secs(VALIDATE_TIMEOUT_SECONDS),
        validate(ctx, envelope),
    )
    .await
    .unwrap_or_else(|_| {
        Err(GatewayError::Storage(
            "Validation timed out".to_string(),
        ))
    });

    let (row, _recipient) = match validated {
        Ok(ok) => ok,
        Err(e) => return settle_failure(ctx, envelope, attempt, tenant_priority, e, 0).await,
    };

    // 3. Admission re-check
    if let Err(e) = admission_recheck(ctx, envelope).await {
        return settle_failure(ctx, envelope, attempt, tenant_priority, e, 0).await;
    }

    // 4. Dispatch under the provider guard stack (hard timeout inside)
    let started = Instant::now();
    let dispatch = dispatch(ctx, envelope, &row).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    // 5. Classify result, record log + event, update outbox
    match dispatch {
        Ok((provider, message_id)) => {
            settle_success(
                ctx, envelope, attempt, &provider, &message_id, duration_ms,
            )
            .await
        }
        Err(e) => settle_failure(ctx, envelope, attempt, tenant_priority, e, duration_ms).await,
    }
}

async fn validate(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
) -> Result<(EmailOutbox, Option<Recipient>), GatewayError> {
    // OUTBOX: the row exists (terminal rows can't be claimed, so status
    // is PROCESSING here by construction)
    let row = ctx
        .outbox
        .get(envelope.job_id)
        .await?
        .ok_or_else(|| GatewayError::OutboxNotFound(envelope.job_id.to_string()))?;

    // INTEGRITY: dispatch-critical fields still satisfy the schema
    validation::validate_email_address(&envelope.to)?;
    validation::validate_subject(&envelope.subject)?;
    validation::validate_recipient_lists(&envelope.cc, &envelope.bcc)?;
    validation::validate_headers(&envelope.headers)?;
    if row.to != envelope.to {
        return Err(GatewayError::InvalidPayload(
            "Envelope recipient does not match outbox row".to_string(),
        ));
    }

    // TEMPLATE: size bounds on the stored body
    if envelope.html_ref.size() > MAX_HTML_BYTES {
        return Err(GatewayError::InvalidTemplate(format!(
            "HTML exceeds {} bytes",
            MAX_HTML_BYTES
        )));
    }

    // RECIPIENT: resolve or create when an identifier block is present
    let recipient = if envelope.recipient.is_empty() {
        None
    } else {
        let lookup = RecipientLookup {
            recipient_id: envelope.recipient.recipient_id,
            external_id: envelope.recipient.external_id.clone(),
            fiscal_hash: envelope.recipient.fiscal_hash.clone(),
        };
        let recipient = ctx
            .recipients
            .resolve_or_create(envelope.company_id, &envelope.to, &lookup, None)
            .await?;
        if !recipient.email.eq_ignore_ascii_case(&envelope.to) {
            return Err(GatewayError::InvalidPayload(format!(
                "Recipient email {} does not match send target",
                redact_email(&recipient.email)
            )));
        }
        Some(recipient)
    };

    Ok((row, recipient))
}

async fn admission_recheck(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
) -> Result<(), GatewayError> {
    let company = ctx
        .companies
        .get(envelope.company_id)
        .await?
        .ok_or_else(|| {
            GatewayError::Forbidden(format!("Unknown company {}", envelope.company_id))
        })?;

    if !company.can_send() {
        return Err(GatewayError::Forbidden(format!(
            "Company {} is not approved for sending",
            company.id
        )));
    }

    if ctx
        .suppression
        .is_suppressed(company.id, &envelope.to)
        .await?
    {
        Metrics::suppression_hit(ctx.metrics.as_ref(), &company.id.to_string()).await;
        return Err(GatewayError::RecipientSuppressed(format!(
            "{} is suppressed",
            redact_email(&envelope.to)
        )));
    }

    // domain gate: sends only leave VERIFIED domains, unless the tenant
    // is sandboxed onto its self-send allow-list
    let from_domain = mailgate_core::utils::redact::email_domain(&envelope.from);
    let domain = ctx
        .domains
        .find_by_name(company.id, &from_domain)
        .await?;
    let verified = domain.as_ref().map(|d| d.allows_sending()).unwrap_or(false);
    if !verified && !(company.sandbox && company.sandbox_allows(&envelope.to)) {
        return Err(GatewayError::DomainNotVerified(format!(
            "Domain {} is not verified",
            from_domain
        )));
    }
    if let Some(domain) = &domain {
        ctx.admission.check_warmup_cap(company.id, domain).await?;
    }

    // daily/monthly cap, counted at dispatch
    ctx.admission.check_sending_caps(&company, "dispatch").await?;

    Ok(())
}

async fn dispatch(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
    row: &EmailOutbox,
) -> Result<(String, String), GatewayError> {
    let html = ctx.body_store.load_html(&envelope.html_ref).await?;

    let mut attachments = Vec::with_capacity(row.attachments.len());
    for meta in &row.attachments {
        if let Some(key) = &meta.storage_key {
            attachments.push((meta.clone(), ctx.body_store.get(key).await?));
        }
    }

    let email = RenderedEmail {
        from: envelope.from.clone(),
        to: envelope.to.clone(),
        cc: envelope.cc.clone(),
        bcc: envelope.bcc.clone(),
        reply_to: envelope.reply_to.clone(),
        subject: envelope.subject.clone(),
        html,
        headers: envelope.headers.clone(),
        attachments,
    };

    let provider = ctx.providers.select(envelope.company_id).await?;
    let provider_name = provider.name().to_string();
    Metrics::dispatched(ctx.metrics.as_ref(), &provider_name).await;

    let outcome = provider.send(&email).await?;
    Ok((provider_name, outcome.provider_message_id))
}

async fn settle_success(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
    attempt: u32,
    provider: &str,
    message_id: &str,
    duration_ms: u64,
) -> Result<JobOutcome, GatewayError> {
    let moved = ctx
        .outbox
        .update_status(
            envelope.job_id,
            &[OutboxStatus::Processing],
            OutboxStatus::Sent,
            StatusFields {
                attempts: Some(attempt),
                provider_message_id: Some(message_id.to_string()),
                ..Default::default()
            },
        )
        .await?;
    if !moved {
        // the state machine never double-transitions through SENT; a row
        // that left PROCESSING under us was settled by someone else
        warn!(job_id = %envelope.job_id, "Row left PROCESSING before SENT transition");
        return Ok(JobOutcome::AlreadyClaimed);
    }

    ctx.outbox
        .append_log(&EmailLog {
            id: Uuid::new_v4(),
            outbox_id: envelope.job_id,
            attempt,
            provider_message_id: Some(message_id.to_string()),
            status: OutboxStatus::Sent,
            error_code: None,
            error_category: None,
            error_reason: None,
            duration_ms,
            created_at: Utc::now(),
        })
        .await?;
    ctx.outbox
        .append_event(
            envelope.job_id,
            EventType::Sent,
            EventMetadata::Sent {
                provider: provider.to_string(),
                provider_message_id: message_id.to_string(),
                duration_ms,
            },
        )
        .await?;

    Metrics::sent(ctx.metrics.as_ref(), provider).await;
    Metrics::dispatch_duration(ctx.metrics.as_ref(), provider, duration_ms as f64).await;
    Metrics::end_to_end(
        ctx.metrics.as_ref(),
        (Utc::now() - envelope.enqueued_at).num_milliseconds().max(0) as f64,
    )
    .await;

    info!(
        job_id = %envelope.job_id,
        provider = provider,
        attempt = attempt,
        duration_ms = duration_ms,
        "Email sent"
    );
    Ok(JobOutcome::Sent)
}

async fn settle_failure(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
    attempt: u32,
    tenant_priority: u8,
    error: GatewayError,
    duration_ms: u64,
) -> Result<JobOutcome, GatewayError> {
    let category = error.category();
    let code = error.code();
    let reason = truncate_reason(&error.to_string());

    if matches!(error, GatewayError::Unknown(_)) {
        // retried like any transient failure, but loudly
        error!(
            job_id = %envelope.job_id,
            attempt = attempt,
            error = %error,
            "Unclassified provider failure"
        );
    }

    ctx.outbox
        .append_log(&EmailLog {
            id: Uuid::new_v4(),
            outbox_id: envelope.job_id,
            attempt,
            provider_message_id: None,
            status: OutboxStatus::Failed,
            error_code: Some(code.to_string()),
            error_category: Some(category),
            error_reason: Some(reason.clone()),
            duration_ms,
            created_at: Utc::now(),
        })
        .await?;

    let retryable = error.is_retryable() && attempt < ctx.queue_config.max_attempts;
    if retryable {
        // RETRY_SCHEDULED: back off with jitter and requeue at the
        // tenant's current fairness priority
        let retry = RetryConfig {
            max_attempts: ctx.queue_config.max_attempts,
            base_delay_ms: ctx.queue_config.base_delay_ms,
            max_delay_ms: ctx.queue_config.max_delay_ms,
            jitter_factor: ctx.queue_config.jitter_factor,
        };
        let delay = retry.retry_delay(attempt);
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(1));

        let moved = ctx
            .outbox
            .update_status(
                envelope.job_id,
                &[OutboxStatus::Processing],
                OutboxStatus::Retrying,
                StatusFields {
                    attempts: Some(attempt),
                    ..Default::default()
                },
            )
            .await?;
        if !moved {
            return Ok(JobOutcome::AlreadyClaimed);
        }
        ctx.outbox
            .append_event(
                envelope.job_id,
                EventType::Retry,
                EventMetadata::Retry {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    next_attempt_at,
                    code: code.to_string(),
                },
            )
            .await?;

        let mut next = envelope.clone();
        next.attempt = attempt + 1;
        next.priority = tenant_priority;
        // enqueued_at stays put so the 24 h TTL is measured from the
        // original enqueue
        ctx.queue.enqueue(&next, delay).await?;

        Metrics::retried(ctx.metrics.as_ref(), code).await;
        warn!(
            job_id = %envelope.job_id,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            code = code,
            "Retry scheduled"
        );
        return Ok(JobOutcome::RetryScheduled);
    }

    // terminal FAILED
    let moved = ctx
        .outbox
        .update_status(
            envelope.job_id,
            &[OutboxStatus::Processing],
            OutboxStatus::Failed,
            StatusFields {
                attempts: Some(attempt),
                ..Default::default()
            },
        )
        .await?;
    if !moved {
        return Ok(JobOutcome::AlreadyClaimed);
    }
    ctx.outbox
        .append_event(
            envelope.job_id,
            EventType::Failed,
            EventMetadata::Failed {
                code: code.to_string(),
                category,
                reason: reason.clone(),
            },
        )
        .await?;
    Metrics::failed(ctx.metrics.as_ref(), category.as_str()).await;

    // DLQ unless the failure is permanent/validation by classification:
    // exhausted retries and operator-fixable configuration failures are
    // replayable, rejected messages are not
    let dlq_eligible =
        error.is_retryable() || category == ErrorCategory::ConfigurationError;
    if dlq_eligible {
        promote_to_dlq(ctx, envelope, attempt, &reason, code).await?;
        return Ok(JobOutcome::DlqPromoted);
    }

    info!(
        job_id = %envelope.job_id,
        code = code,
        "Job failed terminally"
    );
    Ok(JobOutcome::Failed)
}

/// TTL-expired jobs: fail the row (if still possible) and promote
async fn expire_job(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
) -> Result<JobOutcome, GatewayError> {
    let moved = ctx
        .outbox
        .update_status(
            envelope.job_id,
            &[
                OutboxStatus::Enqueued,
                OutboxStatus::Retrying,
                OutboxStatus::Pending,
            ],
            OutboxStatus::Failed,
            StatusFields {
                attempts: Some(envelope.attempt),
                ..Default::default()
            },
        )
        .await
        .unwrap_or(false);
    if !moved {
        return Ok(JobOutcome::AlreadyClaimed);
    }
    ctx.outbox
        .append_event(
            envelope.job_id,
            EventType::Failed,
            EventMetadata::Failed {
                code: "TTL_EXPIRED".to_string(),
                category: ErrorCategory::TimeoutError,
                reason: "TTL_EXPIRED".to_string(),
            },
        )
        .await?;
    promote_to_dlq(ctx, envelope, envelope.attempt, "TTL_EXPIRED", "TTL_EXPIRED").await?;
    Ok(JobOutcome::DlqPromoted)
}

/// Jobs that can never be processed (e.g. missing outbox row)
async fn dead_end(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
    attempt: u32,
    error: GatewayError,
) -> Result<JobOutcome, GatewayError> {
    Metrics::failed(ctx.metrics.as_ref(), error.category().as_str()).await;
    promote_to_dlq(
        ctx,
        envelope,
        attempt,
        &truncate_reason(&error.to_string()),
        error.code(),
    )
    .await?;
    Ok(JobOutcome::DlqPromoted)
}

async fn promote_to_dlq(
    ctx: &WorkerContext,
    envelope: &JobEnvelope,
    failed_attempts: u32,
    reason: &str,
    code: &str,
) -> Result<(), GatewayError> {
    let entry = DlqEntry::new(
        envelope.clone(),
        failed_attempts,
        reason,
        code,
        Duration::from_millis(ctx.queue_config.dlq_ttl_ms),
    )?;
    ctx.dlq.push(entry).await?;
    ctx.outbox
        .append_event(
            envelope.job_id,
            EventType::Dlq,
            EventMetadata::Dlq {
                reason: reason.to_string(),
                failed_attempts,
            },
        )
        .await?;
    Metrics::dlq_promoted(ctx.metrics.as_ref(), code).await;
    warn!(
        job_id = %envelope.job_id,
        failed_attempts = failed_attempts,
        code = code,
        "Job promoted to DLQ"
    );
    Ok(())
}

fn truncate_reason(reason: &str) -> String {
    let mut reason = reason.to_string();
    let mut cut = mailgate_core::constants::MAX_ERROR_REASON_LENGTH.min(reason.len());
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }
    reason.truncate(cut);
    reason
}
