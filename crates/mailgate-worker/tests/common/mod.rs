//! Shared fixtures for worker integration tests
#![allow(dead_code)]

use chrono::Utc;
use mailgate_core::config::{ProviderConfig, QueueConfig, RetentionConfig};
use mailgate_core::models::{
    ApprovalState, BodyRef, Company, DkimStatus, Domain, DomainStatus, EmailOutbox, JobEnvelope,
    OutboxStatus, RateCaps, SendingCaps,
};
use mailgate_core::providers::guard::GuardedProvider;
use mailgate_core::providers::testing::ScriptedProvider;
use mailgate_core::providers::{ProviderBinding, ProviderDriver, ProviderRouter};
use mailgate_core::services::admission::{AdmissionControl, InMemoryCounterStore};
use mailgate_core::services::body_store::InMemoryBodyStore;
use mailgate_core::services::companies::{CompanyStore, InMemoryCompanyStore};
use mailgate_core::services::dlq::InMemoryDlqStore;
use mailgate_core::services::domains::{DomainStore, InMemoryDomainStore};
use mailgate_core::services::metrics::CapturingMetrics;
use mailgate_core::services::outbox::{InMemoryOutboxStore, OutboxStore};
use mailgate_core::services::queue::InMemoryJobQueue;
use mailgate_core::services::recipients::InMemoryRecipientStore;
use mailgate_core::services::suppression::InMemorySuppressionList;
use mailgate_worker::WorkerContext;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a test needs handles to
pub struct Fixture {
    pub ctx: WorkerContext,
    pub outbox: Arc<InMemoryOutboxStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub dlq: Arc<InMemoryDlqStore>,
    pub companies: Arc<InMemoryCompanyStore>,
    pub domains: Arc<InMemoryDomainStore>,
    pub suppression: Arc<InMemorySuppressionList>,
    pub recipients: Arc<InMemoryRecipientStore>,
    pub body_store: Arc<InMemoryBodyStore>,
    pub metrics: Arc<CapturingMetrics>,
    pub company_id: Uuid,
}

pub async fn fixture(provider: Arc<dyn ProviderDriver>) -> Fixture {
    fixture_with_config(provider, fast_queue_config()).await
}

/// Retry delays shrunk so tests run in milliseconds
pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        base_delay_ms: 10,
        max_delay_ms: 100,
        ..QueueConfig::default()
    }
}

pub async fn fixture_with_config(
    provider: Arc<dyn ProviderDriver>,
    queue_config: QueueConfig,
) -> Fixture {
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let dlq = Arc::new(InMemoryDlqStore::new());
    let companies = Arc::new(InMemoryCompanyStore::new());
    let recipients = Arc::new(InMemoryRecipientStore::new());
    let domains = Arc::new(InMemoryDomainStore::new());
    let suppression = Arc::new(InMemorySuppressionList::new());
    let body_store = Arc::new(InMemoryBodyStore::new());
    let metrics = Arc::new(CapturingMetrics::new());

    let guard_config = ProviderConfig {
        send_timeout: std::time::Duration::from_secs(2),
        send_rate_per_second: 10_000.0,
        ..ProviderConfig::default()
    };
    let providers = Arc::new(ProviderRouter::new(vec![ProviderBinding {
        priority: 1,
        company_id: None,
        active: true,
        driver: Arc::new(GuardedProvider::new(provider, &guard_config)),
    }]));

    let company_id = Uuid::new_v4();
    companies.put(&approved_company(company_id)).await.unwrap();
    domains
        .put(&verified_domain(company_id, "acme.com"))
        .await
        .unwrap();

    let ctx = WorkerContext {
        outbox: outbox.clone(),
        queue: queue.clone(),
        dlq: dlq.clone(),
        companies: companies.clone(),
        recipients: recipients.clone(),
        domains: domains.clone(),
        suppression: suppression.clone(),
        admission: Arc::new(AdmissionControl::new(Arc::new(InMemoryCounterStore::new()))),
        body_store: body_store.clone(),
        providers,
        metrics: metrics.clone(),
        queue_config,
        retention: RetentionConfig::default(),
        worker_id: "worker-test".to_string(),
    };

    Fixture {
        ctx,
        outbox,
        queue,
        dlq,
        companies,
        domains,
        suppression,
        recipients,
        body_store,
        metrics,
        company_id,
    }
}

pub fn approved_company(id: Uuid) -> Company {
    Company {
        id,
        name: "Acme".into(),
        api_key_hash: "hash".into(),
        api_key_prefix: "mk_test_".into(),
        allowed_cidrs: vec![],
        rate_caps: RateCaps::default(),
        sending_caps: SendingCaps::default(),
        approval_state: ApprovalState::Approved,
        default_from: "noreply@acme.com".into(),
        bound_domain: Some("acme.com".into()),
        sandbox: false,
        sandbox_recipients: vec![],
        bounce_rate: 0.0,
        complaint_rate: 0.0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn verified_domain(company_id: Uuid, name: &str) -> Domain {
    Domain {
        id: Uuid::new_v4(),
        company_id,
        name: name.into(),
        status: DomainStatus::Verified,
        dkim_status: DkimStatus::Verified,
        dkim_selectors: vec![],
        dkim_tokens: vec![],
        last_checked: Some(Utc::now()),
        probe_successes: 3,
        probe_failures: 0,
        warmup: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Inserts an ENQUEUED outbox row plus matching queue entry, mirroring
/// what the ingestion endpoint commits
pub async fn seed_job(fixture: &Fixture) -> JobEnvelope {
    seed_job_for(fixture, fixture.company_id, "alice@example.com").await
}

pub async fn seed_job_for(fixture: &Fixture, company_id: Uuid, to: &str) -> JobEnvelope {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let row = EmailOutbox {
        id,
        company_id,
        recipient_id: None,
        to: to.into(),
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
        status: OutboxStatus::Enqueued,
        attempts: 0,
        provider_message_id: None,
        request_id: format!("req-{}", id),
        idempotency_key: None,
        created_at: now,
        updated_at: now,
    };
    fixture.outbox.insert(&row).await.unwrap();

    let envelope = JobEnvelope::from_outbox(&row, 1, 5);
    fixture
        .queue
        .enqueue(&envelope, std::time::Duration::ZERO)
        .await
        .unwrap();
    envelope
}

/// Service traits re-exported so `use common::*` puts their methods in
/// scope on the concrete in-memory handles
pub use mailgate_core::services::companies::CompanyStore as _;
pub use mailgate_core::services::dlq::DlqStore as _;
pub use mailgate_core::services::domains::DomainStore as _;
pub use mailgate_core::services::outbox::OutboxStore as _;
pub use mailgate_core::services::queue::JobQueue as _;
pub use mailgate_core::services::recipients::RecipientStore as _;
pub use mailgate_core::services::suppression::SuppressionList as _;

/// Scripted provider helpers re-exported for test readability
pub use mailgate_core::providers::testing::ScriptedResult;

pub fn provider_ok() -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::always_ok("ses"))
}
