/// Worker scheduling: bounded concurrency, tenant fairness bookkeeping,
/// lease extension, graceful shutdown
///
/// The queue hands out batches already interleaved by tenant; this loop
/// bounds in-flight jobs with a semaphore, keeps leases alive while jobs
/// run, and tracks per-tenant fairness so retries are re-enqueued at the
/// starvation-adjusted priority.
use crate::context::WorkerContext;
use crate::pipeline;
use chrono::Utc;
use mailgate_core::constants::{DEFAULT_PRIORITY, JOB_LEASE_SECONDS};
use mailgate_core::models::{QueuedJob, TenantFairness};
use mailgate_core::services::dlq::DlqStore as _;
use mailgate_core::services::metrics::Metrics;
use mailgate_core::services::queue::JobQueue as _;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-process fairness ledger
#[derive(Default)]
pub struct FairnessState {
    tenants: tokio::sync::Mutex<HashMap<Uuid, TenantFairness>>,
}

impl FairnessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Priority a tenant's next enqueue/retry should carry
    pub async fn current_priority(&self, company_id: Uuid) -> u8 {
        self.tenants
            .lock()
            .await
            .get(&company_id)
            .map(|f| f.current_priority)
            .unwrap_or(DEFAULT_PRIORITY)
    }

    /// Applies one received batch: tenants present in the batch are
    /// processed this round, every other known tenant is skipped and its
    /// priority sharpened.
    pub async fn observe_batch(&self, jobs: &[QueuedJob]) {
        let mut tenants = self.tenants.lock().await;
        let now = Utc::now();
        let in_batch: std::collections::HashSet<Uuid> =
            jobs.iter().map(|j| j.envelope.company_id).collect();

        for company_id in &in_batch {
            tenants
                .entry(*company_id)
                .or_insert_with(|| TenantFairness::new(*company_id))
                .mark_processed(now);
        }
        for (company_id, fairness) in tenants.iter_mut() {
            if !in_batch.contains(company_id) {
                fairness.mark_skipped();
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<TenantFairness> {
        self.tenants.lock().await.values().cloned().collect()
    }
}

pub struct Worker {
    ctx: Arc<WorkerContext>,
    fairness: Arc<FairnessState>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(ctx: Arc<WorkerContext>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            ctx,
            fairness: Arc::new(FairnessState::new()),
            shutdown,
        }
    }

    pub fn fairness(&self) -> Arc<FairnessState> {
        self.fairness.clone()
    }

    /// Claim loop. Stops claiming when shutdown flips, then waits up to
    /// the drain window for in-flight jobs before returning.
    pub async fn run(&mut self) {
        let concurrency = self.ctx.queue_config.concurrency;
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut gauge_tick = 0u32;

        info!(
            worker_id = %self.ctx.worker_id,
            concurrency = concurrency,
            "Worker started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let jobs = match self.ctx.queue.receive(concurrency).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    // never crash on queue pressure; back off and retry
                    warn!(error = %e, "Queue receive failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }

            self.fairness.observe_batch(&jobs).await;

            for job in jobs {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let ctx = self.ctx.clone();
                let fairness = self.fairness.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    run_one(ctx, fairness, job).await;
                });
            }

            gauge_tick += 1;
            if gauge_tick % 10 == 0 {
                self.emit_gauges().await;
            }
        }

        info!(worker_id = %self.ctx.worker_id, "Draining in-flight jobs");
        let drain = Duration::from_secs(mailgate_core::constants::DRAIN_TIMEOUT_SECONDS);
        match tokio::time::timeout(drain, semaphore.acquire_many(concurrency as u32)).await {
            Ok(_) => info!("Drain complete"),
            Err(_) => warn!(
                "Drain window elapsed with jobs in flight; leases will expire and \
                 another worker will pick them up"
            ),
        }
    }

    async fn emit_gauges(&self) {
        if let Ok(depth) = self.ctx.queue.depth().await {
            Metrics::queue_depth(self.ctx.metrics.as_ref(), &depth).await;
        }
        if let Ok(depth) = self.ctx.dlq.depth().await {
            Metrics::dlq_depth(self.ctx.metrics.as_ref(), depth).await;
        }
        for fairness in self.fairness.snapshot().await {
            Metrics::fairness_rounds(
                self.ctx.metrics.as_ref(),
                &fairness.company_id.to_string(),
                fairness.rounds_without_processing,
            )
            .await;
        }
    }
}

/// Processes a single job under a lease-extension heartbeat, then acks.
/// An unclean exit leaves the lease to expire so another worker sees the
/// job again.
pub async fn run_one(ctx: Arc<WorkerContext>, fairness: Arc<FairnessState>, job: QueuedJob) {
    let receipt = job.receipt.clone();
    let extender = {
        let ctx = ctx.clone();
        let receipt = receipt.clone();
        tokio::spawn(async move {
            let lease = Duration::from_secs(JOB_LEASE_SECONDS);
            loop {
                tokio::time::sleep(lease / 2).await;
                if let Err(e) = ctx.queue.extend_lease(&receipt, lease).await {
                    warn!(error = %e, "Lease extension failed");
                    break;
                }
            }
        })
    };

    let tenant_priority = fairness.current_priority(job.envelope.company_id).await;
    let result = pipeline::process_job(&ctx, &job, tenant_priority).await;
    extender.abort();

    match result {
        // AlreadyClaimed acks without side-effects; the owning worker
        // settles the row
        Ok(_outcome) => {
            if let Err(e) = ctx.queue.ack(&receipt).await {
                warn!(job_id = %job.envelope.job_id, error = %e, "Ack failed");
            }
        }
        Err(e) => {
            // infrastructure failure mid-pipeline: leave the job leased;
            // it becomes visible again when the lease expires
            error!(
                job_id = %job.envelope.job_id,
                error = %e,
                "Pipeline aborted, job will be redelivered"
            );
        }
    }
}
