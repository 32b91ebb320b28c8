//! Ingestion endpoint contract tests
mod common;

use axum::http::StatusCode;
use common::http::{get, post_json, send};
use common::*;
use mailgate_core::models::{EventType, OutboxStatus};
use uuid::Uuid;

#[tokio::test]
async fn test_send_happy_path() {
    let fixture = fixture().await;

    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), Some("k1"), &send_body()),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "ENQUEUED");
    assert_eq!(body["outboxId"], body["jobId"]);
    assert!(body["requestId"].is_string());
    assert!(body["receivedAt"].is_string());

    let outbox_id: Uuid = body["outboxId"].as_str().unwrap().parse().unwrap();

    // outbox row committed and ENQUEUED
    let row = fixture.outbox.get(outbox_id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Enqueued);
    assert_eq!(row.to, "alice@example.com");

    // queue entry with jobId == outboxId
    let jobs = fixture.queue.receive(10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].envelope.job_id, outbox_id);
    assert_eq!(jobs[0].envelope.priority, 5);

    // events CREATED then ENQUEUED
    let events = fixture.outbox.events(outbox_id).await.unwrap();
    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![EventType::Created, EventType::Enqueued]);
}

#[tokio::test]
async fn test_idempotent_replay_returns_same_row() {
    let fixture = fixture().await;
    let body = send_body();

    let (status1, first) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), Some("k1"), &body),
    )
    .await;
    let (status2, second) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), Some("k1"), &body),
    )
    .await;
    assert_eq!(status1, StatusCode::ACCEPTED);
    assert_eq!(status2, StatusCode::ACCEPTED);
    assert_eq!(first["outboxId"], second["outboxId"]);

    // exactly one enqueue happened
    let depth = fixture.queue.depth().await.unwrap();
    assert_eq!(depth.total(), 1);
}

#[tokio::test]
async fn test_idempotency_conflict_on_different_body() {
    let fixture = fixture().await;

    let (status1, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), Some("k1"), &send_body()),
    )
    .await;
    assert_eq!(status1, StatusCode::ACCEPTED);

    let mut different = send_body();
    different["subject"] = serde_json::json!("Other subject");
    let (status2, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), Some("k1"), &different),
    )
    .await;
    assert_eq!(status2, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    assert!(body["error"]["requestId"].is_string());
}

#[tokio::test]
async fn test_missing_api_key_unauthorized() {
    let fixture = fixture().await;
    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", None, None, &send_body()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_suspended_company_forbidden() {
    let fixture = fixture().await;
    fixture
        .companies
        .set_approval_state(
            fixture.company_id,
            mailgate_core::models::ApprovalState::Suspended,
        )
        .await
        .unwrap();

    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &send_body()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_subject_boundaries() {
    let fixture = fixture().await;

    let mut ok = send_body();
    ok["subject"] = serde_json::json!("s".repeat(150));
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &ok),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut too_long = send_body();
    too_long["subject"] = serde_json::json!("s".repeat(151));
    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &too_long),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let mut with_newline = send_body();
    with_newline["subject"] = serde_json::json!("line\nbreak");
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &with_newline),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cc_boundaries() {
    let fixture = fixture().await;

    let mut five = send_body();
    five["cc"] = serde_json::json!(
        (0..5).map(|i| format!("u{}@example.com", i)).collect::<Vec<_>>()
    );
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &five),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut six = send_body();
    six["cc"] = serde_json::json!(
        (0..6).map(|i| format!("u{}@example.com", i)).collect::<Vec<_>>()
    );
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &six),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suppressed_recipient_forbidden() {
    let fixture = fixture().await;
    fixture
        .suppression
        .suppress(
            &fixture.company_id.to_string(),
            "alice@example.com",
            mailgate_core::services::suppression::SuppressionReason::Bounce,
        )
        .await
        .unwrap();

    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &send_body()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "RECIPIENT_SUPPRESSED");
}

#[tokio::test]
async fn test_unverified_domain_rejected_unless_sandbox() {
    let fixture = fixture().await;

    let mut from_unverified = send_body();
    from_unverified["from"] = serde_json::json!("noreply@other.io");
    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &from_unverified),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "DOMAIN_NOT_VERIFIED");

    // sandbox tenants may self-send to their allow-list
    let mut sandboxed = test_company(fixture.company_id);
    sandboxed.sandbox = true;
    sandboxed.sandbox_recipients = vec!["alice@example.com".into()];
    fixture.companies.put(&sandboxed).await.unwrap();

    let mut sandbox_send = send_body();
    sandbox_send["from"] = serde_json::json!("noreply@other.io");
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &sandbox_send),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_html_is_sanitized_before_persist() {
    let fixture = fixture().await;

    let mut body = send_body();
    body["html"] =
        serde_json::json!(r#"<p>hi</p><script>alert('x')</script><a href="https://e.com">go</a>"#);
    let (status, response) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let outbox_id: Uuid = response["outboxId"].as_str().unwrap().parse().unwrap();
    let row = fixture.outbox.get(outbox_id).await.unwrap().unwrap();
    match &row.html_ref {
        mailgate_core::models::BodyRef::Inline { html } => {
            assert!(!html.contains("script"));
            assert!(html.contains(r#"rel="noopener noreferrer""#));
        }
        other => panic!("expected inline body, got {:?}", other),
    }
}

#[tokio::test]
async fn test_recipient_with_fiscal_id_encrypted() {
    let fixture = fixture().await;

    let mut body = send_body();
    body["recipient"] = serde_json::json!({
        "externalId": "cust-42",
        "cpfCnpj": "12345678901",
        "name": "Alice Silva",
    });
    let (status, response) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response["recipient"]["externalId"], "cust-42");

    let outbox_id: Uuid = response["outboxId"].as_str().unwrap().parse().unwrap();
    let row = fixture.outbox.get(outbox_id).await.unwrap().unwrap();
    let recipient = fixture
        .recipients
        .get(row.recipient_id.unwrap())
        .await
        .unwrap()
        .unwrap();

    // plaintext fiscal id never persisted
    let fiscal = recipient.fiscal.unwrap();
    assert!(!fiscal.ciphertext.contains("12345678901"));
    assert!(!fiscal.hash.contains("12345678901"));
    assert_eq!(fiscal.key_version, "v1");
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let fixture = fixture().await;
    let mut capped = test_company(fixture.company_id);
    capped.rate_caps.per_minute = 2;
    fixture.companies.put(&capped).await.unwrap();

    for _ in 0..2 {
        let (status, _) = send(
            &fixture.app,
            post_json("/v1/email/send", Some(API_KEY), None, &send_body()),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    let (status, body) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &send_body()),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_attachment_limits() {
    use base64::Engine;
    let fixture = fixture().await;
    let content = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4");

    // 11 attachments rejected
    let mut body = send_body();
    body["attachments"] = serde_json::json!(
        (0..11)
            .map(|i| serde_json::json!({
                "filename": format!("f{}.pdf", i),
                "contentType": "application/pdf",
                "content": content,
            }))
            .collect::<Vec<_>>()
    );
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // executables rejected
    let mut body = send_body();
    body["attachments"] = serde_json::json!([{
        "filename": "run.exe",
        "contentType": "application/x-msdownload",
        "content": content,
    }]);
    let (status, _) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a PDF is fine
    let mut body = send_body();
    body["attachments"] = serde_json::json!([{
        "filename": "doc.pdf",
        "contentType": "application/pdf",
        "content": content,
    }]);
    let (status, response) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let outbox_id: Uuid = response["outboxId"].as_str().unwrap().parse().unwrap();
    let row = fixture.outbox.get(outbox_id).await.unwrap().unwrap();
    assert_eq!(row.attachments.len(), 1);
    assert!(row.attachments[0].storage_key.is_some());
}

#[tokio::test]
async fn test_health_requires_no_auth() {
    let fixture = fixture().await;
    let (status, body) = send(&fixture.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
