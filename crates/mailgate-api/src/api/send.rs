/// POST /v1/email/send: the ingestion endpoint
///
/// Contract: on 202 the outbox row is committed and the job durably
/// enqueued before the response is written. Write order is
/// outbox(PENDING) → CREATED event → enqueue → ENQUEUED + event; a
/// failed enqueue leaves the PENDING row for the sweeper and the client
/// keeps its outboxId.
use crate::auth::{AuthCompany, RequestId};
use crate::context::ApiContext;
use crate::error::{ApiError, FieldError};
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::{Json, http::StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use mailgate_core::constants::{DEFAULT_PRIORITY, IDEMPOTENCY_TTL_SECONDS};
use mailgate_core::error::GatewayError;
use mailgate_core::models::{
    AttachmentMeta, EmailOutbox, EventMetadata, EventType, JobEnvelope, OutboxStatus, RecipientRef,
};
use mailgate_core::services::body_store::BodyStore as _;
use mailgate_core::services::domains::DomainStore as _;
use mailgate_core::services::idempotency::IdempotencyStore as _;
use mailgate_core::services::idempotency::{IdempotencyOutcome, payload_hash};
use mailgate_core::services::metrics::Metrics;
use mailgate_core::services::outbox::{OutboxStore as _, StatusFields};
use mailgate_core::services::queue::JobQueue as _;
use mailgate_core::services::recipients::{RecipientLookup, RecipientStore as _};
use mailgate_core::services::suppression::SuppressionList as _;
use mailgate_core::services::secrets::{fiscal_lookup_hash, protect_fiscal_id};
use mailgate_core::utils::sanitize::{attachment_digest, sanitize_html};
use mailgate_core::utils::validation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub to: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
    #[serde(default)]
    pub recipient: Option<RecipientBlock>,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: String,
    /// Base64-encoded content
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientBlock {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub external_id: Option<String>,
    /// Fiscal identifier; never persisted in plaintext
    #[serde(default)]
    pub cpf_cnpj: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub legal_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailResponse {
    pub outbox_id: Uuid,
    pub job_id: Uuid,
    pub request_id: String,
    pub status: &'static str,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<RecipientEcho>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientEcho {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

pub async fn handler(
    State(ctx): State<Arc<ApiContext>>,
    Extension(AuthCompany(company)): Extension<AuthCompany>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<SendEmailResponse>), ApiError> {
    let started = Instant::now();
    let err = |e: GatewayError| ApiError::new(e, request_id.clone());

    let request: SendEmailRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::new(
            GatewayError::InvalidPayload(e.to_string()),
            request_id.clone(),
        )
    })?;

    // ---- validate -----------------------------------------------------
    validate_request(&request).map_err(|e| {
        let details = vec![FieldError {
            field: "body".into(),
            message: e.to_string(),
            value: None,
        }];
        ApiError::new(e, request_id.clone()).with_details(details)
    })?;

    let to = request.to.trim().to_ascii_lowercase();
    let from = request
        .from
        .clone()
        .unwrap_or_else(|| company.default_from.clone());
    validation::validate_email_address(&from).map_err(&err)?;

    let header_vec: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    // ---- admission ----------------------------------------------------
    ctx.admission.check_request_rate(&company).await.map_err(&err)?;
    ctx.admission
        .check_sending_caps(&company, "accept")
        .await
        .map_err(&err)?;

    if ctx
        .suppression
        .is_suppressed(company.id, &to)
        .await
        .map_err(&err)?
    {
        Metrics::suppression_hit(ctx.metrics.as_ref(), &company.id.to_string()).await;
        Metrics::rejected(ctx.metrics.as_ref(), "RECIPIENT_SUPPRESSED").await;
        return Err(err(GatewayError::RecipientSuppressed(format!(
            "{} is suppressed",
            mailgate_core::utils::redact::redact_email(&to)
        ))));
    }

    // domain gate: only VERIFIED domains send; sandbox tenants may hit
    // their self-send allow-list
    let from_domain = mailgate_core::utils::redact::email_domain(&from);
    let domain = ctx
        .domains
        .find_by_name(company.id, &from_domain)
        .await
        .map_err(&err)?;
    let verified = domain.as_ref().map(|d| d.allows_sending()).unwrap_or(false);
    if !verified && !(company.sandbox && company.sandbox_allows(&to)) {
        Metrics::rejected(ctx.metrics.as_ref(), "DOMAIN_NOT_VERIFIED").await;
        return Err(err(GatewayError::DomainNotVerified(format!(
            "Domain {} is not verified for sending",
            from_domain
        ))));
    }
    if let Some(domain) = &domain {
        ctx.admission
            .check_warmup_cap(company.id, domain)
            .await
            .map_err(&err)?;
    }

    // ---- sanitize (mandatory; the sanitized HTML is what is sent) -----
    let html = sanitize_html(&request.html);
    validation::validate_html_size(&html).map_err(&err)?;

    // ---- attachments --------------------------------------------------
    let mut attachment_contents: Vec<(AttachmentMeta, Vec<u8>)> = Vec::new();
    for upload in &request.attachments {
        let content = BASE64.decode(&upload.content).map_err(|e| {
            err(GatewayError::Validation(format!(
                "Attachment {} is not valid base64: {}",
                upload.filename, e
            )))
        })?;
        let meta = AttachmentMeta {
            filename: upload.filename.clone(),
            content_type: upload.content_type.clone(),
            size: content.len(),
            digest: attachment_digest(&content),
            storage_key: None,
        };
        attachment_contents.push((meta, content));
    }
    let metas: Vec<AttachmentMeta> = attachment_contents.iter().map(|(m, _)| m.clone()).collect();
    validation::validate_attachments(&metas).map_err(&err)?;

    // ---- recipient resolution (fiscal id encrypted before storage) ----
    let (recipient_ref, recipient_echo) = resolve_recipient(ctx.as_ref(), &company.id, &request, &to)
        .await
        .map_err(&err)?;

    // ---- idempotency --------------------------------------------------
    let outbox_id = Uuid::new_v4();
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string());

    if let Some(key) = &idempotency_key {
        let hash = payload_hash(&ctx.security.hash_key, &body);
        match ctx
            .idempotency
            .put_or_get(
                company.id,
                key,
                outbox_id,
                &hash,
                Duration::from_secs(IDEMPOTENCY_TTL_SECONDS),
            )
            .await
            .map_err(&err)?
        {
            IdempotencyOutcome::Inserted => {}
            IdempotencyOutcome::Replay {
                outbox_id: original,
                received_at,
            } => {
                info!(outbox_id = %original, "Idempotent replay, returning original row");
                return Ok((
                    StatusCode::ACCEPTED,
                    Json(SendEmailResponse {
                        outbox_id: original,
                        job_id: original,
                        request_id: request_id.clone(),
                        status: "ENQUEUED",
                        received_at,
                        recipient: recipient_echo,
                    }),
                ));
            }
            IdempotencyOutcome::Conflict => {
                Metrics::rejected(ctx.metrics.as_ref(), "CONFLICT").await;
                return Err(err(GatewayError::Conflict(
                    "Idempotency-Key was already used with a different payload".to_string(),
                )));
            }
        }
    }

    // ---- persist + enqueue (outbox-then-queue) ------------------------
    let html_ref = ctx
        .body_store
        .store_html(outbox_id, &html)
        .await
        .map_err(&err)?;
    let mut stored_metas = Vec::with_capacity(attachment_contents.len());
    for (index, (mut meta, content)) in attachment_contents.into_iter().enumerate() {
        let key = ctx
            .body_store
            .attachment_key(outbox_id, index, &meta.filename);
        ctx.body_store.put(&key, content).await.map_err(&err)?;
        meta.storage_key = Some(key);
        stored_metas.push(meta);
    }

    let now = Utc::now();
    let row = EmailOutbox {
        id: outbox_id,
        company_id: company.id,
        recipient_id: recipient_ref.recipient_id,
        to: to.clone(),
        cc: request.cc.clone(),
        bcc: request.bcc.clone(),
        from,
        subject: request.subject.clone(),
        html_ref,
        reply_to: request.reply_to.clone(),
        headers: header_vec,
        tags: request.tags.clone(),
        attachments: stored_metas,
        status: OutboxStatus::Pending,
        attempts: 0,
        provider_message_id: None,
        request_id: request_id.clone(),
        idempotency_key,
        created_at: now,
        updated_at: now,
    };
    ctx.outbox.insert(&row).await.map_err(&err)?;
    ctx.outbox
        .append_event(
            outbox_id,
            EventType::Created,
            EventMetadata::Created {
                request_id: request_id.clone(),
            },
        )
        .await
        .map_err(&err)?;

    let mut envelope = JobEnvelope::from_outbox(&row, 1, DEFAULT_PRIORITY);
    envelope.recipient = recipient_ref;

    if let Err(e) = ctx.queue.enqueue(&envelope, Duration::ZERO).await {
        // the PENDING row stays behind for the sweeper; the client can
        // retry with the same idempotency key
        warn!(outbox_id = %outbox_id, error = %e, "Enqueue failed after outbox commit");
        Metrics::rejected(ctx.metrics.as_ref(), e.code()).await;
        return Err(err(e));
    }

    let moved = ctx
        .outbox
        .update_status(
            outbox_id,
            &[OutboxStatus::Pending],
            OutboxStatus::Enqueued,
            StatusFields::default(),
        )
        .await
        .map_err(&err)?;
    if moved {
        ctx.outbox
            .append_event(
                outbox_id,
                EventType::Enqueued,
                EventMetadata::Enqueued {
                    priority: envelope.priority,
                },
            )
            .await
            .map_err(&err)?;
    } else {
        // a worker already claimed the PENDING row; it proceeds regardless
        info!(outbox_id = %outbox_id, "Row claimed before ENQUEUED transition");
    }

    Metrics::accepted(ctx.metrics.as_ref(), &company.id.to_string()).await;
    Metrics::enqueued(ctx.metrics.as_ref(), &company.id.to_string()).await;
    Metrics::ingestion_latency(ctx.metrics.as_ref(), started.elapsed().as_millis() as f64).await;

    info!(
        outbox_id = %outbox_id,
        company = %company.id,
        to = %mailgate_core::utils::redact::redact_email(&to),
        subject = %mailgate_core::utils::redact::redact_subject(&request.subject),
        "Send accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SendEmailResponse {
            outbox_id,
            job_id: outbox_id,
            request_id: request_id.clone(),
            status: "ENQUEUED",
            received_at: now,
            recipient: recipient_echo,
        }),
    ))
}

fn validate_request(request: &SendEmailRequest) -> Result<(), GatewayError> {
    validation::validate_email_address(request.to.trim())?;
    validation::validate_subject(&request.subject)?;
    validation::validate_recipient_lists(&request.cc, &request.bcc)?;
    let header_vec: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    validation::validate_headers(&header_vec)?;
    validation::validate_tags(&request.tags)?;
    validation::validate_html_size(&request.html)?;
    if let Some(reply_to) = &request.reply_to {
        validation::validate_email_address(reply_to)?;
    }
    Ok(())
}

/// Resolves or creates the recipient at ingestion, where the fiscal
/// plaintext still exists; the queue envelope carries ids only
async fn resolve_recipient(
    ctx: &ApiContext,
    company_id: &Uuid,
    request: &SendEmailRequest,
    to: &str,
) -> Result<(RecipientRef, Option<RecipientEcho>), GatewayError> {
    let Some(block) = &request.recipient else {
        return Ok((RecipientRef::default(), None));
    };

    let fiscal_hash = block
        .cpf_cnpj
        .as_deref()
        .map(|plain| fiscal_lookup_hash(&ctx.security.hash_key, plain));

    if block.id.is_none() && block.external_id.is_none() && fiscal_hash.is_none() {
        return Err(GatewayError::Validation(
            "Recipient block requires at least one of id, externalId, cpfCnpj".to_string(),
        ));
    }

    let lookup = RecipientLookup {
        recipient_id: block.id,
        external_id: block.external_id.clone(),
        fiscal_hash: fiscal_hash.clone(),
    };
    let fiscal = match block.cpf_cnpj.as_deref() {
        Some(plain) => Some(
            protect_fiscal_id(ctx.cipher.as_ref(), &ctx.security.hash_key, plain).await?,
        ),
        None => None,
    };

    let mut recipient = ctx
        .recipients
        .resolve_or_create(*company_id, to, &lookup, fiscal)
        .await?;
    if recipient.display_name.is_none() && block.name.is_some() {
        recipient.display_name = block.name.clone();
        recipient.legal_name = recipient.legal_name.take().or_else(|| block.legal_name.clone());
        recipient.updated_at = Utc::now();
        ctx.recipients.put(&recipient).await?;
    }

    Ok((
        RecipientRef {
            recipient_id: Some(recipient.id),
            external_id: recipient.external_id.clone(),
            fiscal_hash,
        },
        Some(RecipientEcho {
            external_id: recipient.external_id.clone(),
        }),
    ))
}
