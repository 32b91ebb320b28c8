//! Read API: listings, pagination, masking and break-glass
mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::http::{get, post_json, send};
use common::*;
use uuid::Uuid;

async fn accept_one(fixture: &ApiFixture, subject: &str, tag: &str) -> Uuid {
    let mut body = send_body();
    body["subject"] = serde_json::json!(subject);
    body["tags"] = serde_json::json!([tag]);
    let (status, response) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    response["outboxId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_list_with_pagination() {
    let fixture = fixture().await;
    for i in 0..5 {
        accept_one(&fixture, &format!("Mail {}", i), "billing").await;
    }

    let (status, body) = send(&fixture.app, get("/v1/emails?pageSize=2", Some(API_KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["emails"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["hasMore"], true);
    assert_eq!(body["pagination"]["total"], 5);

    // follow the cursor to the rest
    let cursor = body["pagination"]["nextCursor"].as_str().unwrap().to_string();
    let (status, second) = send(
        &fixture.app,
        get(
            &format!("/v1/emails?pageSize=100&cursor={}", cursor),
            Some(API_KEY),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["emails"].as_array().unwrap().len(), 3);
    assert_eq!(second["pagination"]["hasMore"], false);
}

#[tokio::test]
async fn test_cursor_and_offset_cannot_mix() {
    let fixture = fixture().await;
    accept_one(&fixture, "Mail", "t").await;

    let (_, body) = send(&fixture.app, get("/v1/emails?pageSize=1", Some(API_KEY))).await;
    let cursor = body["pagination"]["nextCursor"].as_str();
    // with a single row there may be no cursor; craft one if absent
    let cursor = cursor.map(|c| c.to_string()).unwrap_or_else(|| {
        mailgate_core::utils::pagination::Cursor {
            created_at: chrono::Utc::now(),
            id: Uuid::new_v4(),
        }
        .encode()
    });

    let (status, body) = send(
        &fixture.app,
        get(
            &format!("/v1/emails?offset=1&cursor={}", cursor),
            Some(API_KEY),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_status_and_tag_filters() {
    let fixture = fixture().await;
    accept_one(&fixture, "Billing mail", "billing").await;
    accept_one(&fixture, "Onboarding mail", "onboarding").await;

    let (status, body) = send(
        &fixture.app,
        get("/v1/emails?tags=billing", Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let emails = body["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["subject"], "Billing mail");

    let (_, enqueued) = send(
        &fixture.app,
        get("/v1/emails?status=ENQUEUED", Some(API_KEY)),
    )
    .await;
    assert_eq!(enqueued["emails"].as_array().unwrap().len(), 2);

    let (_, sent) = send(&fixture.app, get("/v1/emails?status=SENT", Some(API_KEY))).await;
    assert_eq!(sent["emails"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_detail_includes_event_timeline() {
    let fixture = fixture().await;
    let id = accept_one(&fixture, "Mail", "t").await;

    let (status, body) = send(
        &fixture.app,
        get(&format!("/v1/emails/{}", id), Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.to_string());
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "CREATED");
    assert_eq!(events[1]["event_type"], "ENQUEUED");
}

#[tokio::test]
async fn test_detail_scoped_to_tenant() {
    let fixture = fixture().await;
    let id = accept_one(&fixture, "Mail", "t").await;

    // another company using a different key cannot see the row
    let other_id = Uuid::new_v4();
    let mut other = test_company(other_id);
    other.api_key_hash = mailgate_core::services::companies::hash_api_key(
        &secrecy::SecretString::from(HASH_KEY.to_string()),
        "mk_other_key",
    );
    fixture.companies.put(&other).await.unwrap();

    let (status, body) = send(
        &fixture.app,
        get(&format!("/v1/emails/{}", id), Some("mk_other_key")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "OUTBOX_NOT_FOUND");
}

#[tokio::test]
async fn test_fiscal_masked_without_break_glass() {
    let fixture = fixture().await;

    let mut body = send_body();
    body["recipient"] = serde_json::json!({
        "externalId": "cust-7",
        "cpfCnpj": "12345678901",
        "legalName": "Alice Silva",
    });
    let (_, response) = send(
        &fixture.app,
        post_json("/v1/email/send", Some(API_KEY), None, &body),
    )
    .await;
    let id: Uuid = response["outboxId"].as_str().unwrap().parse().unwrap();

    // default profile sees masked values
    let (status, detail) = send(
        &fixture.app,
        get(&format!("/v1/emails/{}", id), Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let masked = detail["recipient"]["cpfCnpj"].as_str().unwrap();
    assert!(!masked.contains("12345678901"));
    assert!(masked.contains('*'));

    // break-glass session unmasks and audits
    let (status, session) = send(&fixture.app, {
        let mut request = Request::builder()
            .method("POST")
            .uri("/v1/break-glass")
            .header("Content-Type", "application/json")
            .header("X-Operator-Token", operator_token("audit"));
        request = request.header("X-Request-Id", "bg-1");
        request
            .body(Body::from(
                serde_json::json!({"justification": "support ticket 4211 investigation"})
                    .to_string(),
            ))
            .unwrap()
    })
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = session["sessionToken"].as_str().unwrap();

    let (status, unmasked) = send(&fixture.app, {
        Request::builder()
            .method("GET")
            .uri(format!("/v1/emails/{}", id))
            .header("X-API-Key", API_KEY)
            .header("X-Break-Glass-Session", token)
            .body(Body::empty())
            .unwrap()
    })
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unmasked["recipient"]["cpfCnpj"], "12345678901");
    assert_eq!(unmasked["recipient"]["legalName"], "Alice Silva");

    // the unmasked read was audited
    let audit_events = fixture.audit.events().await;
    assert_eq!(audit_events.len(), 1);
    assert_eq!(audit_events[0].resource, format!("emails/{}", id));
}

#[tokio::test]
async fn test_break_glass_requires_audit_profile() {
    let fixture = fixture().await;
    let (status, body) = send(&fixture.app, {
        Request::builder()
            .method("POST")
            .uri("/v1/break-glass")
            .header("Content-Type", "application/json")
            .header("X-Operator-Token", operator_token("operations"))
            .body(Body::from(
                serde_json::json!({"justification": "a perfectly long justification here"})
                    .to_string(),
            ))
            .unwrap()
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_admin_company_lifecycle() {
    let fixture = fixture().await;
    let target = Uuid::new_v4();
    let mut pending = test_company(target);
    pending.approval_state = mailgate_core::models::ApprovalState::Pending;
    pending.api_key_hash = "other-hash".into();
    fixture.companies.put(&pending).await.unwrap();

    let approve = |path: String| {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("X-Operator-Token", operator_token("operations"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(
        &fixture.app,
        approve(format!("/v1/admin/companies/{}/approve", target)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approvalState"], "approved");

    let (status, body) = send(
        &fixture.app,
        approve(format!("/v1/admin/companies/{}/suspend", target)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approvalState"], "suspended");
}

#[tokio::test]
async fn test_admin_domain_onboarding() {
    let fixture = fixture().await;

    let (status, body) = send(&fixture.app, {
        Request::builder()
            .method("POST")
            .uri("/v1/admin/domains")
            .header("Content-Type", "application/json")
            .header("X-Operator-Token", operator_token("operations"))
            .body(Body::from(
                serde_json::json!({
                    "companyId": fixture.company_id,
                    "name": "New-Domain.com",
                })
                .to_string(),
            ))
            .unwrap()
    })
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "new-domain.com");
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["dkimTokens"].as_array().unwrap().len(), 3);
}
