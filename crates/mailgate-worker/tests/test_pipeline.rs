//! End-to-end pipeline scenarios over the in-memory service graph
mod common;

use common::*;
use mailgate_core::error::GatewayError;
use mailgate_core::models::{EventType, OutboxStatus};
use mailgate_core::providers::testing::{ScriptedProvider, ScriptedResult};
use mailgate_worker::pipeline::{self, JobOutcome};
use std::sync::Arc;
use std::time::Duration;

async fn receive_one(fixture: &common::Fixture) -> mailgate_core::models::QueuedJob {
    loop {
        let mut jobs = fixture.queue.receive(1).await.unwrap();
        if let Some(job) = jobs.pop() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_happy_path() {
    let fixture = fixture(Arc::new(ScriptedProvider::new(
        "ses",
        vec![ScriptedResult::Ok("ses-msg-1".into())],
    )))
    .await;
    let envelope = seed_job(&fixture).await;

    let job = receive_one(&fixture).await;
    let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::Sent);

    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Sent);
    assert_eq!(row.provider_message_id.as_deref(), Some("ses-msg-1"));
    assert_eq!(row.attempts, 1);

    // events: PROCESSING then SENT appended by the worker
    let events = fixture.outbox.events(envelope.job_id).await.unwrap();
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![EventType::Processing, EventType::Sent]);

    // one success log with a provider message id
    let logs = fixture.outbox.logs(envelope.job_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, OutboxStatus::Sent);
    assert!(logs[0].provider_message_id.is_some());
}

#[tokio::test]
async fn test_transient_failure_retries_then_sends() {
    // ServiceUnavailable on attempts 1-2, success on attempt 3
    let fixture = fixture(Arc::new(ScriptedProvider::new(
        "ses",
        vec![
            ScriptedResult::Err(GatewayError::ProviderUnavailable, "down".into()),
            ScriptedResult::Err(GatewayError::ProviderUnavailable, "down".into()),
            ScriptedResult::Ok("ses-msg-3".into()),
        ],
    )))
    .await;
    let envelope = seed_job(&fixture).await;

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let job = receive_one(&fixture).await;
        let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
        fixture.queue.ack(&job.receipt).await.unwrap();
        outcomes.push(outcome);
    }
    assert_eq!(
        outcomes,
        vec![
            JobOutcome::RetryScheduled,
            JobOutcome::RetryScheduled,
            JobOutcome::Sent
        ]
    );

    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Sent);
    assert_eq!(row.attempts, 3);

    // two RETRY events whose delays respect min(MAX, BASE·2^(N−1)) ± 25 %
    let events = fixture.outbox.events(envelope.job_id).await.unwrap();
    let retries: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::Retry)
        .collect();
    assert_eq!(retries.len(), 2);
    let cfg = fast_queue_config();
    for (i, event) in retries.iter().enumerate() {
        let attempt = (i + 1) as u32;
        if let mailgate_core::models::EventMetadata::Retry {
            delay_ms,
            attempt: meta_attempt,
            ..
        } = &event.metadata
        {
            assert_eq!(*meta_attempt, attempt);
            let base = cfg.base_delay_ms * 2u64.pow(attempt - 1);
            let capped = base.min(cfg.max_delay_ms) as f64;
            let lo = (capped * 0.75) as u64;
            let hi = (capped * 1.25).ceil() as u64;
            assert!(
                (lo..=hi).contains(delay_ms),
                "retry {} delay {}ms outside [{}, {}]",
                attempt,
                delay_ms,
                lo,
                hi
            );
        } else {
            panic!("retry event missing retry metadata");
        }
    }

    // attempts == RETRY events + 1
    assert_eq!(row.attempts as usize, retries.len() + 1);
}

#[tokio::test]
async fn test_permanent_failure_no_dlq() {
    let fixture = fixture(Arc::new(ScriptedProvider::new(
        "ses",
        vec![ScriptedResult::Err(
            GatewayError::ProviderMessageRejected,
            "MessageRejected".into(),
        )],
    )))
    .await;
    let envelope = seed_job(&fixture).await;

    let job = receive_one(&fixture).await;
    let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Failed);

    let events = fixture.outbox.events(envelope.job_id).await.unwrap();
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![EventType::Processing, EventType::Failed]);

    // PERMANENT classification is not DLQ-eligible
    assert_eq!(fixture.dlq.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_timeouts_exhaust_to_dlq() {
    // provider times out on every attempt
    let fixture = fixture(Arc::new(ScriptedProvider::new(
        "ses",
        (0..5)
            .map(|_| ScriptedResult::Err(GatewayError::ProviderTimeout, "Provider timeout".into()))
            .collect(),
    )))
    .await;
    let envelope = seed_job(&fixture).await;

    for attempt in 1..=5 {
        let job = receive_one(&fixture).await;
        let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
        fixture.queue.ack(&job.receipt).await.unwrap();
        if attempt < 5 {
            assert_eq!(outcome, JobOutcome::RetryScheduled);
        } else {
            assert_eq!(outcome, JobOutcome::DlqPromoted);
        }
    }

    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Failed);
    assert_eq!(row.attempts, 5);

    let entries = fixture
        .dlq
        .list(&Default::default(), 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].failed_attempts, 5);
    assert_eq!(entries[0].outbox_id, envelope.job_id);
    assert!(!entries[0].last_failure_reason.is_empty());
    assert!(entries[0].last_failure_reason.contains("Provider timeout"));
}

#[tokio::test]
async fn test_replay_after_dlq_leads_to_sent() {
    // 5 timeouts, then a healthy provider for the replay
    let mut script: Vec<ScriptedResult> = (0..5)
        .map(|_| ScriptedResult::Err(GatewayError::ProviderTimeout, "Provider timeout".into()))
        .collect();
    script.push(ScriptedResult::Ok("ses-after-replay".into()));
    let fixture = fixture(Arc::new(ScriptedProvider::new("ses", script))).await;
    let envelope = seed_job(&fixture).await;

    for _ in 0..5 {
        let job = receive_one(&fixture).await;
        pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
        fixture.queue.ack(&job.receipt).await.unwrap();
    }
    assert_eq!(fixture.dlq.depth().await.unwrap(), 1);

    let report = mailgate_worker::replay::replay(
        &fixture.ctx,
        &mailgate_worker::replay::ReplayOptions {
            delay_between: Duration::from_millis(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(report.replayed, 1);
    assert!(!report.aborted);
    assert_eq!(fixture.dlq.depth().await.unwrap(), 0);

    // replay preserved the outbox id and reset the attempt counter
    let job = receive_one(&fixture).await;
    assert_eq!(job.envelope.job_id, envelope.job_id);
    assert_eq!(job.envelope.attempt, 1);

    let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::Sent);
    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Sent);
    assert_eq!(row.provider_message_id.as_deref(), Some("ses-after-replay"));
}

#[tokio::test]
async fn test_claim_races_ack_without_side_effects() {
    let fixture = fixture(provider_ok()).await;
    let envelope = seed_job(&fixture).await;

    let job = receive_one(&fixture).await;
    // simulate another worker having already claimed the row
    fixture
        .outbox
        .update_status(
            envelope.job_id,
            &[OutboxStatus::Enqueued],
            OutboxStatus::Processing,
            Default::default(),
        )
        .await
        .unwrap();

    let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::AlreadyClaimed);

    // no events or logs were written by the losing worker
    assert!(fixture.outbox.events(envelope.job_id).await.unwrap().is_empty());
    assert!(fixture.outbox.logs(envelope.job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_terminal_row_never_redispatched() {
    let fixture = fixture(provider_ok()).await;
    let envelope = seed_job(&fixture).await;

    let job = receive_one(&fixture).await;
    pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();

    // a duplicate delivery of the same job (at-least-once queue)
    fixture
        .queue
        .enqueue(&envelope, Duration::ZERO)
        .await
        .unwrap();
    let duplicate = receive_one(&fixture).await;
    let outcome = pipeline::process_job(&fixture.ctx, &duplicate, 5)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::AlreadyClaimed);

    // exactly one SENT event, ever
    let events = fixture.outbox.events(envelope.job_id).await.unwrap();
    let sent = events
        .iter()
        .filter(|e| e.event_type == EventType::Sent)
        .count();
    assert_eq!(sent, 1);
}

#[tokio::test]
async fn test_suppressed_recipient_fails_permanently() {
    let fixture = fixture(provider_ok()).await;
    let envelope = seed_job(&fixture).await;
    fixture
        .suppression
        .suppress(
            &fixture.company_id.to_string(),
            "alice@example.com",
            mailgate_core::services::suppression::SuppressionReason::Bounce,
        )
        .await
        .unwrap();

    let job = receive_one(&fixture).await;
    let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);

    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Failed);
    assert_eq!(fixture.metrics.count("SuppressionHits").await, 1);
}

#[tokio::test]
async fn test_unverified_domain_blocks_dispatch() {
    let fixture = fixture(provider_ok()).await;
    // seed a job whose from-domain has no verified record
    let envelope = seed_job(&fixture).await;
    let mut row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    row.from = "noreply@unverified.io".into();

    let fresh = common::fixture(provider_ok()).await;
    fresh
        .companies
        .put(&common::approved_company(row.company_id))
        .await
        .unwrap();
    fresh.outbox.insert(&row).await.unwrap();
    let env = mailgate_core::models::JobEnvelope::from_outbox(&row, 1, 5);
    fresh.queue.enqueue(&env, Duration::ZERO).await.unwrap();

    let job = receive_one(&fresh).await;
    let outcome = pipeline::process_job(&fresh.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);
    let settled = fresh.outbox.get(row.id).await.unwrap().unwrap();
    assert_eq!(settled.status, OutboxStatus::Failed);
}

#[tokio::test]
async fn test_ttl_expired_job_goes_to_dlq() {
    let fixture = fixture(provider_ok()).await;
    let mut envelope = seed_job(&fixture).await;
    envelope.enqueued_at = chrono::Utc::now() - chrono::Duration::hours(25);

    let job = mailgate_core::models::QueuedJob {
        envelope: envelope.clone(),
        receipt: "expired-receipt".into(),
    };
    let outcome = pipeline::process_job(&fixture.ctx, &job, 5).await.unwrap();
    assert_eq!(outcome, JobOutcome::DlqPromoted);

    let row = fixture.outbox.get(envelope.job_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Failed);
    let entries = fixture.dlq.list(&Default::default(), 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].last_failure_reason, "TTL_EXPIRED");
}
