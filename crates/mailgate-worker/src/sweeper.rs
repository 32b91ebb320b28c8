/// Background sweeper
///
/// Three jobs, one loop: re-enqueue PENDING outbox rows whose enqueue
/// never completed (at-least-once enqueue), prune DLQ entries past their
/// TTL, and run due domain-verification probes.
use crate::context::WorkerContext;
use chrono::Utc;
use mailgate_core::constants::{
    DEFAULT_PRIORITY, SWEEPER_INTERVAL_SECONDS, SWEEPER_PENDING_GRACE_SECONDS,
};
use mailgate_core::error::GatewayError;
use mailgate_core::models::{EventMetadata, EventType, JobEnvelope, OutboxStatus};
use mailgate_core::services::dlq::DlqStore as _;
use mailgate_core::services::domains::{self, DomainStore as _, DomainVerifier};
use mailgate_core::services::outbox::{OutboxStore as _, StatusFields};
use mailgate_core::services::queue::JobQueue as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub re_enqueued: usize,
    pub dlq_pruned: usize,
    pub domains_probed: usize,
    pub pseudonymized: usize,
}

/// One pass over everything the sweeper owns
pub async fn sweep_once(
    ctx: &WorkerContext,
    verifier: Option<&dyn DomainVerifier>,
) -> Result<SweepReport, GatewayError> {
    let mut report = SweepReport::default();

    // PENDING rows older than the grace period: the client already holds
    // an outboxId, so the row must reach the queue eventually
    let cutoff = Utc::now() - chrono::Duration::seconds(SWEEPER_PENDING_GRACE_SECONDS);
    let stale = ctx.outbox.stale_pending(cutoff, 100).await?;
    for row in stale {
        let envelope = JobEnvelope::from_outbox(&row, 1, DEFAULT_PRIORITY);
        match ctx.queue.enqueue(&envelope, Duration::ZERO).await {
            Ok(()) => {
                let moved = ctx
                    .outbox
                    .update_status(
                        row.id,
                        &[OutboxStatus::Pending],
                        OutboxStatus::Enqueued,
                        StatusFields::default(),
                    )
                    .await?;
                if moved {
                    ctx.outbox
                        .append_event(
                            row.id,
                            EventType::Enqueued,
                            EventMetadata::Enqueued {
                                priority: envelope.priority,
                            },
                        )
                        .await?;
                    report.re_enqueued += 1;
                    info!(outbox_id = %row.id, "Re-enqueued stale PENDING row");
                }
                // a lost CAS means a worker already claimed the PENDING
                // row directly; nothing to do
            }
            Err(e) => {
                // queue still refusing writes; the row stays PENDING for
                // the next sweep
                warn!(outbox_id = %row.id, error = %e, "Re-enqueue failed, will retry");
            }
        }
    }

    report.dlq_pruned = ctx.dlq.prune_expired().await?;

    // retention: settled rows past the horizon lose their PII
    let retention_cutoff = Utc::now() - chrono::Duration::days(ctx.retention.outbox_days);
    report.pseudonymized = ctx
        .outbox
        .pseudonymize_older_than(retention_cutoff, 100)
        .await?;

    if let Some(verifier) = verifier {
        let due = ctx.domains.due_for_probe(20).await?;
        for domain in due {
            domains::run_probe(ctx.domains.as_ref(), verifier, domain).await?;
            report.domains_probed += 1;
        }
    }

    Ok(report)
}

/// Sweeper loop; runs until shutdown flips
pub async fn run(
    ctx: Arc<WorkerContext>,
    verifier: Option<Arc<dyn DomainVerifier>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(SWEEPER_INTERVAL_SECONDS);
    loop {
        if *shutdown.borrow() {
            return;
        }
        match sweep_once(&ctx, verifier.as_deref()).await {
            Ok(report) if report != SweepReport::default() => {
                info!(
                    re_enqueued = report.re_enqueued,
                    dlq_pruned = report.dlq_pruned,
                    domains_probed = report.domains_probed,
                    pseudonymized = report.pseudonymized,
                    "Sweep pass complete"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Sweep pass failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}
