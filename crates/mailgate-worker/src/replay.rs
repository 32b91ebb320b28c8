/// DLQ replay tool
///
/// Drains DLQ entries selectively (by job id, by error code, by tenant),
/// re-enqueuing each with attempt reset to 1 and the original outboxId
/// preserved. Re-enqueue is rate-limited, and K consecutive failures
/// abort the run.
use crate::context::WorkerContext;
use chrono::Utc;
use mailgate_core::constants::{REPLAY_CIRCUIT_THRESHOLD, REPLAY_DELAY_MS};
use mailgate_core::error::GatewayError;
use mailgate_core::models::{EventMetadata, EventType};
use mailgate_core::services::dlq::{DlqFilter, DlqStore as _};
use mailgate_core::services::outbox::OutboxStore as _;
use mailgate_core::services::queue::JobQueue as _;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub job_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub error_code: Option<String>,
    pub limit: usize,
    /// Pause between re-enqueued jobs
    pub delay_between: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            job_id: None,
            company_id: None,
            error_code: None,
            limit: 100,
            delay_between: Duration::from_millis(REPLAY_DELAY_MS),
        }
    }
}

impl ReplayOptions {
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        let parse_uuid = |name: &str| -> Result<Option<Uuid>, GatewayError> {
            match std::env::var(name) {
                Ok(raw) => Uuid::parse_str(&raw)
                    .map(Some)
                    .map_err(|_| GatewayError::Config(format!("{} must be a UUID", name))),
                Err(_) => Ok(None),
            }
        };
        Ok(Self {
            job_id: parse_uuid("REPLAY_JOB_ID")?,
            company_id: parse_uuid("REPLAY_COMPANY_ID")?,
            error_code: std::env::var("REPLAY_ERROR_CODE").ok(),
            limit: std::env::var("REPLAY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.limit),
            delay_between: std::env::var("REPLAY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay_between),
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: bool,
}

pub async fn replay(
    ctx: &WorkerContext,
    options: &ReplayOptions,
) -> Result<ReplayReport, GatewayError> {
    let filter = DlqFilter {
        job_id: options.job_id,
        company_id: options.company_id,
        error_code: options.error_code.clone(),
    };
    let entries = ctx.dlq.list(&filter, options.limit).await?;
    info!(count = entries.len(), "Replaying DLQ entries");

    let mut report = ReplayReport::default();
    let mut consecutive_failures = 0u32;

    for entry in entries {
        if consecutive_failures >= REPLAY_CIRCUIT_THRESHOLD {
            warn!(
                consecutive_failures = consecutive_failures,
                "Replay circuit tripped, aborting"
            );
            report.aborted = true;
            break;
        }

        match replay_one(ctx, &entry).await {
            Ok(true) => {
                consecutive_failures = 0;
                report.replayed += 1;
            }
            Ok(false) => {
                report.skipped += 1;
            }
            Err(e) => {
                consecutive_failures += 1;
                report.failed += 1;
                warn!(job_id = %entry.job_id, error = %e, "Replay of entry failed");
            }
        }

        tokio::time::sleep(options.delay_between).await;
    }

    info!(
        replayed = report.replayed,
        skipped = report.skipped,
        failed = report.failed,
        aborted = report.aborted,
        "Replay finished"
    );
    Ok(report)
}

/// Re-enqueues one entry. Returns Ok(false) when the outbox row refuses
/// to reopen (already replayed, or settled some other way).
async fn replay_one(
    ctx: &WorkerContext,
    entry: &mailgate_core::models::DlqEntry,
) -> Result<bool, GatewayError> {
    // operator override: FAILED → RETRYING with attempts reset
    let reopened = ctx.outbox.reopen(entry.outbox_id).await?;
    if !reopened {
        info!(job_id = %entry.job_id, "Row not reopenable, skipping replay");
        ctx.dlq.remove(entry.job_id).await?;
        return Ok(false);
    }

    let mut envelope = entry.original_payload.clone();
    envelope.attempt = 1;
    envelope.enqueued_at = Utc::now();

    ctx.queue.enqueue(&envelope, Duration::ZERO).await?;
    ctx.outbox
        .append_event(
            entry.outbox_id,
            EventType::Enqueued,
            EventMetadata::Enqueued {
                priority: envelope.priority,
            },
        )
        .await?;
    ctx.dlq.remove(entry.job_id).await?;

    info!(job_id = %entry.job_id, "DLQ entry re-enqueued");
    Ok(true)
}
