//! Shared fixtures for API integration tests
#![allow(dead_code)]

use axum::Router;
use chrono::Utc;
use mailgate_api::ApiContext;
use mailgate_core::config::{QueueConfig, SecurityConfig};
use mailgate_core::models::{
    ApprovalState, Company, DkimStatus, Domain, DomainStatus, RateCaps, SendingCaps,
};
use mailgate_core::services::admission::{AdmissionControl, InMemoryCounterStore};
use mailgate_core::services::audit::{BreakGlass, InMemoryAuditLog};
use mailgate_core::services::body_store::InMemoryBodyStore;
use mailgate_core::services::companies::{CompanyStore, InMemoryCompanyStore, hash_api_key};
use mailgate_core::services::dlq::InMemoryDlqStore;
use mailgate_core::services::domains::{DomainStore, InMemoryDomainStore, MockDomainVerifier};
use mailgate_core::services::idempotency::InMemoryIdempotencyStore;
use mailgate_core::services::metrics::CapturingMetrics;
use mailgate_core::services::outbox::InMemoryOutboxStore;
use mailgate_core::services::queue::InMemoryJobQueue;
use mailgate_core::services::recipients::InMemoryRecipientStore;
use mailgate_core::services::secrets::StaticFiscalCipher;
use mailgate_core::services::suppression::InMemorySuppressionList;
use secrecy::SecretString;
use std::sync::Arc;
use uuid::Uuid;

/// Service traits re-exported so `use common::*` puts their methods in
/// scope on the concrete in-memory handles
pub use mailgate_core::services::companies::CompanyStore as _;
pub use mailgate_core::services::domains::DomainStore as _;
pub use mailgate_core::services::outbox::OutboxStore as _;
pub use mailgate_core::services::queue::JobQueue as _;
pub use mailgate_core::services::recipients::RecipientStore as _;
pub use mailgate_core::services::suppression::SuppressionList as _;

pub const API_KEY: &str = "mk_test_0123456789";
pub const HASH_KEY: &str = "test-hash-key";
pub const BREAK_GLASS_SECRET: &str = "test-break-glass-secret";

pub struct ApiFixture {
    pub app: Router,
    pub ctx: Arc<ApiContext>,
    pub outbox: Arc<InMemoryOutboxStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub recipients: Arc<InMemoryRecipientStore>,
    pub suppression: Arc<InMemorySuppressionList>,
    pub companies: Arc<InMemoryCompanyStore>,
    pub domains: Arc<InMemoryDomainStore>,
    pub audit: Arc<InMemoryAuditLog>,
    pub company_id: Uuid,
}

pub async fn fixture() -> ApiFixture {
    let security = SecurityConfig {
        hash_key: SecretString::from(HASH_KEY.to_string()),
        break_glass_secret: SecretString::from(BREAK_GLASS_SECRET.to_string()),
    };

    let outbox = Arc::new(InMemoryOutboxStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let dlq = Arc::new(InMemoryDlqStore::new());
    let idempotency = Arc::new(InMemoryIdempotencyStore::new());
    let companies = Arc::new(InMemoryCompanyStore::new());
    let recipients = Arc::new(InMemoryRecipientStore::new());
    let domains = Arc::new(InMemoryDomainStore::new());
    let suppression = Arc::new(InMemorySuppressionList::new());
    let body_store = Arc::new(InMemoryBodyStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());

    let company_id = Uuid::new_v4();
    companies.put(&test_company(company_id)).await.unwrap();
    domains
        .put(&verified_domain(company_id, "acme.com"))
        .await
        .unwrap();

    let ctx = Arc::new(ApiContext {
        outbox: outbox.clone(),
        queue: queue.clone(),
        dlq: dlq.clone(),
        idempotency,
        companies: companies.clone(),
        recipients: recipients.clone(),
        domains: domains.clone(),
        domain_verifier: Arc::new(MockDomainVerifier::new(vec![])),
        suppression: suppression.clone(),
        admission: Arc::new(AdmissionControl::new(Arc::new(InMemoryCounterStore::new()))),
        body_store,
        cipher: Arc::new(StaticFiscalCipher::new(
            SecretString::from("test-cipher-key".to_string()),
            "v1",
        )),
        audit: audit.clone(),
        break_glass: Arc::new(BreakGlass::new(SecretString::from(BREAK_GLASS_SECRET.to_string()))),
        metrics: Arc::new(CapturingMetrics::new()),
        security,
        queue_config: QueueConfig::default(),
    });

    ApiFixture {
        app: mailgate_api::router(ctx.clone()),
        ctx,
        outbox,
        queue,
        recipients,
        suppression,
        companies,
        domains,
        audit,
        company_id,
    }
}

pub fn test_company(id: Uuid) -> Company {
    Company {
        id,
        name: "Acme".into(),
        api_key_hash: hash_api_key(&SecretString::from(HASH_KEY.to_string()), API_KEY),
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

/// Operator token signed the way deployment tooling signs them
pub fn operator_token(profile: &str) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};
    let now = Utc::now().timestamp();
    let claims = serde_json::json!({
        "sub": "op-1",
        "profile": profile,
        "iat": now,
        "exp": now + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(BREAK_GLASS_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Minimal valid send body
pub fn send_body() -> serde_json::Value {
    serde_json::json!({
        "to": "alice@example.com",
        "subject": "Hi",
        "html": "<p>hi</p>",
    })
}

pub mod http {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use tower::ServiceExt;

    pub async fn send(
        app: &Router,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response: Response<_> = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    pub fn post_json(
        path: &str,
        api_key: Option<&str>,
        idempotency_key: Option<&str>,
        body: &serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("X-API-Key", key);
        }
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub fn get(path: &str, api_key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(key) = api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).unwrap()
    }
}
