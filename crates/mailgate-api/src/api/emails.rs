/// GET /v1/emails and GET /v1/emails/:id
///
/// Listings are tenant-scoped, paginated by offset or opaque cursor, and
/// masked by default; unmasked PII requires an active break-glass
/// session, and every unmasked read is audited.
use crate::auth::{AuthCompany, RequestId};
use crate::context::ApiContext;
use crate::error::ApiError;
use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use mailgate_core::error::GatewayError;
use mailgate_core::models::{EmailEvent, EmailLog, EmailOutbox, OutboxStatus, Recipient};
use mailgate_core::services::audit::{BreakGlassClaims, audit_access};
use mailgate_core::services::outbox::{OutboxFilter, OutboxStore as _};
use mailgate_core::services::recipients::RecipientStore as _;
use mailgate_core::services::secrets::{FiscalCipher as _, fiscal_lookup_hash};
use mailgate_core::utils::pagination::{PageInfo, PageRequest};
use mailgate_core::utils::redact::mask_fiscal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailsQuery {
    /// Comma-separated status list
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub to: Option<String>,
    pub recipient_external_id: Option<String>,
    /// Hashed server-side before any lookup runs
    pub cpf_cnpj: Option<String>,
    pub razao_social: Option<String>,
    pub nome: Option<String>,
    pub external_id: Option<String>,
    /// Comma-separated tags
    pub tags: Option<String>,
    pub page_size: Option<usize>,
    pub offset: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: Uuid,
    pub to: String,
    pub subject: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailsResponse {
    pub emails: Vec<EmailSummary>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDetail {
    #[serde(flatten)]
    pub summary: EmailSummary,
    pub from: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub request_id: String,
    pub attachment_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<RecipientView>,
    pub events: Vec<EmailEvent>,
    pub logs: Vec<EmailLog>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientView {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub email: String,
    /// Masked unless the request carries an audited break-glass session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpf_cnpj: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,
}

fn summarize(row: &EmailOutbox) -> EmailSummary {
    EmailSummary {
        id: row.id,
        to: row.to.clone(),
        subject: row.subject.clone(),
        status: row.status,
        attempts: row.attempts,
        provider_message_id: row.provider_message_id.clone(),
        tags: row.tags.clone(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub async fn list(
    State(ctx): State<Arc<ApiContext>>,
    Extension(AuthCompany(company)): Extension<AuthCompany>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Query(query): Query<EmailsQuery>,
) -> Result<Json<EmailsResponse>, ApiError> {
    let err = |e: GatewayError| ApiError::new(e, request_id.clone());

    let statuses = match &query.status {
        Some(raw) => raw
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim().parse::<OutboxStatus>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| err(GatewayError::Validation(e)))?,
        None => Vec::new(),
    };
    let tags = query
        .tags
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .filter(|t| !t.is_empty())
                .map(|t| t.trim().to_string())
                .collect()
        })
        .unwrap_or_default();

    // recipient-identifying filters resolve to ids before the listing
    let mut recipient_ids: Vec<Uuid> = Vec::new();
    let mut recipient_filtered = false;
    if let Some(external_id) = query
        .recipient_external_id
        .as_ref()
        .or(query.external_id.as_ref())
    {
        recipient_filtered = true;
        if let Some(r) = ctx
            .recipients
            .find(
                company.id,
                &mailgate_core::services::recipients::RecipientLookup {
                    external_id: Some(external_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(&err)?
        {
            recipient_ids.push(r.id);
        }
    }
    if let Some(cpf_cnpj) = &query.cpf_cnpj {
        recipient_filtered = true;
        let hash = fiscal_lookup_hash(&ctx.security.hash_key, cpf_cnpj);
        if let Some(r) = ctx
            .recipients
            .find(
                company.id,
                &mailgate_core::services::recipients::RecipientLookup {
                    fiscal_hash: Some(hash),
                    ..Default::default()
                },
            )
            .await
            .map_err(&err)?
        {
            recipient_ids.push(r.id);
        }
    }
    for name in [query.nome.as_ref(), query.razao_social.as_ref()]
        .into_iter()
        .flatten()
    {
        recipient_filtered = true;
        for r in ctx
            .recipients
            .find_by_name(company.id, name)
            .await
            .map_err(&err)?
        {
            recipient_ids.push(r.id);
        }
    }
    if recipient_filtered && recipient_ids.is_empty() {
        // identifier filters that match no recipient match no emails
        return Ok(Json(EmailsResponse {
            emails: vec![],
            pagination: PageInfo {
                page_size: query.page_size.unwrap_or(20),
                offset: query.offset,
                next_cursor: None,
                total: Some(0),
                has_more: false,
            },
        }));
    }

    let filter = OutboxFilter {
        company_id: Some(company.id),
        statuses,
        date_from: query.date_from,
        date_to: query.date_to,
        to: query.to.clone().map(|t| t.to_ascii_lowercase()),
        recipient_ids,
        tags,
    };
    let page = PageRequest::new(query.page_size, query.offset, query.cursor.as_deref())
        .map_err(&err)?;
    let result = ctx.outbox.list(&filter, &page).await.map_err(&err)?;

    Ok(Json(EmailsResponse {
        emails: result.rows.iter().map(summarize).collect(),
        pagination: result.pagination,
    }))
}

pub async fn detail(
    State(ctx): State<Arc<ApiContext>>,
    Extension(AuthCompany(company)): Extension<AuthCompany>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<EmailDetail>, ApiError> {
    let err = |e: GatewayError| ApiError::new(e, request_id.clone());

    let row = ctx
        .outbox
        .get(id)
        .await
        .map_err(&err)?
        .filter(|r| r.company_id == company.id)
        .ok_or_else(|| err(GatewayError::OutboxNotFound(id.to_string())))?;

    let events = ctx.outbox.events(id).await.map_err(&err)?;
    let logs = ctx.outbox.logs(id).await.map_err(&err)?;

    // break-glass: unmask only under a valid session, and audit the read
    let break_glass = match headers
        .get("X-Break-Glass-Session")
        .and_then(|v| v.to_str().ok())
    {
        Some(token) => {
            let claims = ctx.break_glass.verify(token).map_err(&err)?;
            let ip = headers
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            audit_access(
                ctx.audit.as_ref(),
                &claims,
                &format!("emails/{}", id),
                ip,
            )
            .await
            .map_err(&err)?;
            Some(claims)
        }
        None => None,
    };

    let recipient = match row.recipient_id {
        Some(rid) => match ctx.recipients.get(rid).await.map_err(&err)? {
            Some(r) => Some(
                recipient_view(ctx.as_ref(), r, break_glass.as_ref())
                    .await
                    .map_err(&err)?,
            ),
            None => None,
        },
        None => None,
    };

    Ok(Json(EmailDetail {
        summary: summarize(&row),
        from: row.from.clone(),
        cc: row.cc.clone(),
        bcc: row.bcc.clone(),
        request_id: row.request_id.clone(),
        attachment_count: row.attachments.len(),
        recipient,
        events,
        logs,
    }))
}

async fn recipient_view(
    ctx: &ApiContext,
    recipient: Recipient,
    break_glass: Option<&BreakGlassClaims>,
) -> Result<RecipientView, GatewayError> {
    let unmasked = break_glass.is_some();
    let cpf_cnpj = match (&recipient.fiscal, unmasked) {
        (Some(fiscal), true) => {
            let plaintext = ctx
                .cipher
                .decrypt(&fiscal.ciphertext, &fiscal.key_version)
                .await?;
            Some(String::from_utf8_lossy(&plaintext).to_string())
        }
        (Some(fiscal), false) => Some(mask_fiscal(&fiscal.hash)),
        (None, _) => None,
    };

    Ok(RecipientView {
        id: recipient.id,
        external_id: recipient.external_id.clone(),
        email: recipient.email.clone(),
        cpf_cnpj,
        name: recipient.display_name.clone(),
        legal_name: if unmasked {
            recipient.legal_name.clone()
        } else {
            recipient.masked_legal_name()
        },
    })
}
