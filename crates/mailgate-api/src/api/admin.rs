/// Admin surface: company approval, domain onboarding, DLQ inspection
///
/// Narrow CRUD over the stores; the dashboard consuming these endpoints
/// is an external collaborator.
use crate::auth::{Operator, RequestId};
use crate::context::ApiContext;
use crate::error::ApiError;
use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use mailgate_core::error::GatewayError;
use mailgate_core::models::{ApprovalState, Company, DlqEntry, Domain};
use mailgate_core::services::companies::CompanyStore as _;
use mailgate_core::services::dlq::{DlqFilter, DlqStore as _};
use mailgate_core::services::domains::{self, DomainStore as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub approval_state: ApprovalState,
    pub api_key_prefix: String,
    pub sandbox: bool,
}

fn company_response(company: &Company) -> CompanyResponse {
    CompanyResponse {
        id: company.id,
        name: company.name.clone(),
        approval_state: company.approval_state,
        api_key_prefix: company.api_key_prefix.clone(),
        sandbox: company.sandbox,
    }
}

async fn transition_company(
    ctx: &ApiContext,
    operator: &str,
    request_id: &str,
    id: Uuid,
    state: ApprovalState,
) -> Result<Json<CompanyResponse>, ApiError> {
    let company = ctx
        .companies
        .set_approval_state(id, state)
        .await
        .map_err(|e| ApiError::new(e, request_id.to_string()))?;
    // approval transitions are audited
    info!(
        target: "audit",
        company = %id,
        operator = operator,
        state = ?state,
        "Company approval state changed"
    );
    Ok(Json(company_response(&company)))
}

pub async fn approve_company(
    State(ctx): State<Arc<ApiContext>>,
    Extension(Operator(operator)): Extension<Operator>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyResponse>, ApiError> {
    transition_company(&ctx, &operator.sub, &request_id, id, ApprovalState::Approved).await
}

pub async fn reject_company(
    State(ctx): State<Arc<ApiContext>>,
    Extension(Operator(operator)): Extension<Operator>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyResponse>, ApiError> {
    transition_company(&ctx, &operator.sub, &request_id, id, ApprovalState::Rejected).await
}

pub async fn suspend_company(
    State(ctx): State<Arc<ApiContext>>,
    Extension(Operator(operator)): Extension<Operator>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyResponse>, ApiError> {
    // suspension is soft: in-flight jobs drain, new requests are refused
    transition_company(&ctx, &operator.sub, &request_id, id, ApprovalState::Suspended).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardDomainRequest {
    pub company_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResponse {
    pub id: Uuid,
    pub name: String,
    pub status: mailgate_core::models::DomainStatus,
    pub dkim_status: mailgate_core::models::DkimStatus,
    /// Publish each as `<token>._domainkey.<domain>`
    pub dkim_tokens: Vec<String>,
}

fn domain_response(domain: &Domain) -> DomainResponse {
    DomainResponse {
        id: domain.id,
        name: domain.name.clone(),
        status: domain.status,
        dkim_status: domain.dkim_status,
        dkim_tokens: domain.dkim_tokens.clone(),
    }
}

pub async fn onboard_domain(
    State(ctx): State<Arc<ApiContext>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<OnboardDomainRequest>,
) -> Result<Json<DomainResponse>, ApiError> {
    let domain = domains::onboard_domain(
        ctx.domains.as_ref(),
        ctx.domain_verifier.as_ref(),
        request.company_id,
        &request.name,
    )
    .await
    .map_err(|e| ApiError::new(e, request_id))?;
    Ok(Json(domain_response(&domain)))
}

pub async fn verify_domain(
    State(ctx): State<Arc<ApiContext>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<DomainResponse>, ApiError> {
    let err = |e: GatewayError| ApiError::new(e, request_id.clone());
    let domain = ctx
        .domains
        .get(id)
        .await
        .map_err(&err)?
        .ok_or_else(|| err(GatewayError::Validation(format!("Unknown domain {}", id))))?;
    let domain = domains::run_probe(ctx.domains.as_ref(), ctx.domain_verifier.as_ref(), domain)
        .await
        .map_err(&err)?;
    Ok(Json(domain_response(&domain)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqQuery {
    pub job_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub error_code: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_dlq(
    State(ctx): State<Arc<ApiContext>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Query(query): Query<DlqQuery>,
) -> Result<Json<Vec<DlqEntry>>, ApiError> {
    let filter = DlqFilter {
        job_id: query.job_id,
        company_id: query.company_id,
        error_code: query.error_code,
    };
    let entries = ctx
        .dlq
        .list(&filter, query.limit.unwrap_or(100).min(1000))
        .await
        .map_err(|e| ApiError::new(e, request_id))?;
    Ok(Json(entries))
}
