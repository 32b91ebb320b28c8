//! Sweeper behavior: at-least-once enqueue and DLQ hygiene
mod common;

use chrono::Utc;
use common::*;
use mailgate_core::models::{BodyRef, EmailOutbox, EventType, OutboxStatus};
use mailgate_worker::sweeper;
use uuid::Uuid;

/// Outbox row committed by an ingestion whose enqueue step failed
async fn stranded_pending_row(fixture: &common::Fixture) -> EmailOutbox {
    let id = Uuid::new_v4();
    let created = Utc::now() - chrono::Duration::minutes(5);
    let row = EmailOutbox {
        id,
        company_id: fixture.company_id,
        recipient_id: None,
        to: "alice@example.com".into(),
        cc: vec![],
        bcc: vec![],
        from: "noreply@acme.com".into(),
        subject: "Hi".into(),
        html_ref: BodyRef::Inline {
            html: "<p>hi</p>".into(),
        },
        reply_to: None,
        headers: vec![],
        tags: vec![],
        attachments: vec![],
        status: OutboxStatus::Pending,
        attempts: 0,
        provider_message_id: None,
        request_id: format!("req-{}", id),
        idempotency_key: None,
        created_at: created,
        updated_at: created,
    };
    fixture.outbox.insert(&row).await.unwrap();
    row
}

#[tokio::test]
async fn test_stale_pending_rows_re_enqueued() {
    let fixture = fixture(provider_ok()).await;
    let row = stranded_pending_row(&fixture).await;

    let report = sweeper::sweep_once(&fixture.ctx, None).await.unwrap();
    assert_eq!(report.re_enqueued, 1);

    let updated = fixture.outbox.get(row.id).await.unwrap().unwrap();
    assert_eq!(updated.status, OutboxStatus::Enqueued);

    let events = fixture.outbox.events(row.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Enqueued);

    // the queue entry exists with jobId == outboxId
    let jobs = fixture.queue.receive(10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].envelope.job_id, row.id);

    // a second pass finds nothing to do
    let second = sweeper::sweep_once(&fixture.ctx, None).await.unwrap();
    assert_eq!(second.re_enqueued, 0);
}

#[tokio::test]
async fn test_fresh_pending_rows_left_alone() {
    let fixture = fixture(provider_ok()).await;
    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut row = stranded_pending_row(&fixture).await;
    row.id = id;
    row.created_at = now;
    row.updated_at = now;
    fixture.outbox.insert(&row).await.unwrap();

    let report = sweeper::sweep_once(&fixture.ctx, None).await.unwrap();
    // only the stale row moves; the fresh one is inside its grace period
    assert_eq!(report.re_enqueued, 1);
    let fresh = fixture.outbox.get(id).await.unwrap().unwrap();
    assert_eq!(fresh.status, OutboxStatus::Pending);
}

#[tokio::test]
async fn test_expired_dlq_entries_pruned() {
    let fixture = fixture(provider_ok()).await;
    let envelope = seed_job(&fixture).await;

    let mut entry = mailgate_core::models::DlqEntry::new(
        envelope,
        5,
        "Provider timeout",
        "PROVIDER_TIMEOUT",
        std::time::Duration::from_secs(1),
    )
    .unwrap();
    entry.expires_at = Utc::now() - chrono::Duration::hours(1);
    fixture.dlq.push(entry).await.unwrap();

    let report = sweeper::sweep_once(&fixture.ctx, None).await.unwrap();
    assert_eq!(report.dlq_pruned, 1);
    assert_eq!(fixture.dlq.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_retention_pseudonymizes_settled_rows() {
    let fixture = fixture(provider_ok()).await;

    // a SENT row from far beyond the retention horizon
    let mut old = stranded_pending_row(&fixture).await;
    old.status = OutboxStatus::Sent;
    old.created_at = Utc::now() - chrono::Duration::days(200);
    fixture.outbox.insert(&{
        let mut fresh = old.clone();
        fresh.id = Uuid::new_v4();
        fresh.created_at = Utc::now();
        fresh
    })
    .await
    .unwrap();
    // overwrite the stranded row with the aged SENT copy
    let aged_id = Uuid::new_v4();
    let mut aged = old.clone();
    aged.id = aged_id;
    fixture.outbox.insert(&aged).await.unwrap();

    let report = sweeper::sweep_once(&fixture.ctx, None).await.unwrap();
    assert_eq!(report.pseudonymized, 1);

    let redacted = fixture.outbox.get(aged_id).await.unwrap().unwrap();
    assert_eq!(redacted.subject, "[redacted]");
    assert!(!redacted.to.contains("alice"));
    assert_eq!(redacted.status, OutboxStatus::Sent);

    // recent rows keep their data
    let report = sweeper::sweep_once(&fixture.ctx, None).await.unwrap();
    assert_eq!(report.pseudonymized, 0);
}

#[tokio::test]
async fn test_domain_probes_run_when_due() {
    use mailgate_core::models::{DkimStatus, DomainStatus};
    use mailgate_core::services::domains::{MockDomainVerifier, ProbeOutcome};

    let fixture = fixture(provider_ok()).await;
    let company = fixture.company_id;
    let pending = mailgate_core::models::Domain {
        id: Uuid::new_v4(),
        company_id: company,
        name: "new-domain.com".into(),
        status: DomainStatus::Pending,
        dkim_status: DkimStatus::Pending,
        dkim_selectors: vec![],
        dkim_tokens: vec![],
        last_checked: None,
        probe_successes: 0,
        probe_failures: 0,
        warmup: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    fixture.domains.put(&pending).await.unwrap();

    let ok = ProbeOutcome {
        identity_verified: true,
        dkim_verified: true,
    };
    let verifier = MockDomainVerifier::new(vec![ok]);
    let report = sweeper::sweep_once(&fixture.ctx, Some(&verifier))
        .await
        .unwrap();
    assert_eq!(report.domains_probed, 1);

    let probed = fixture.domains.get(pending.id).await.unwrap().unwrap();
    assert_eq!(probed.probe_successes, 1);
    assert_eq!(probed.status, DomainStatus::Pending);
}
