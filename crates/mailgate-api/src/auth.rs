/// Request authentication and admission at the HTTP edge
///
/// Partner requests carry `X-API-Key`; the key is HMAC-hashed and looked
/// up, the company's approval state and CIDR allow-list are enforced,
/// and the company rides the request as an extension. Operator requests
/// (admin + break-glass) carry a signed `X-Operator-Token`.
use crate::context::ApiContext;
use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use mailgate_core::error::GatewayError;
use mailgate_core::models::Company;
use mailgate_core::services::admission::ip_allowed;
use mailgate_core::services::companies::{CompanyStore as _, hash_api_key};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Authenticated tenant, attached as a request extension
#[derive(Clone)]
pub struct AuthCompany(pub Arc<Company>);

/// Request id, honored from `X-Request-Id` or generated
#[derive(Clone)]
pub struct RequestId(pub String);

pub fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn peer_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

/// Middleware for the partner surface
pub async fn require_api_key(
    State(ctx): State<Arc<ApiContext>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = request_id_from(request.headers());

    let api_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::new(
                GatewayError::Unauthorized("Missing X-API-Key header".to_string()),
                request_id.clone(),
            )
        })?;

    let hash = hash_api_key(&ctx.security.hash_key, api_key);
    let company = ctx
        .companies
        .get_by_api_key_hash(&hash)
        .await
        .map_err(|e| ApiError::new(e, request_id.clone()))?
        .ok_or_else(|| {
            ApiError::new(
                GatewayError::Unauthorized("Unknown API key".to_string()),
                request_id.clone(),
            )
        })?;

    if !company.can_send() {
        warn!(
            company = %company.id,
            key_prefix = %company.api_key_prefix,
            state = ?company.approval_state,
            "Request from non-approved company"
        );
        return Err(ApiError::new(
            GatewayError::Forbidden(format!(
                "Company is {:?}",
                company.approval_state
            )),
            request_id,
        ));
    }

    if let Some(ip) = peer_ip(request.headers()) {
        if !ip_allowed(&company.allowed_cidrs, ip) {
            return Err(ApiError::new(
                GatewayError::Forbidden(format!("Address {} not in allow-list", ip)),
                request_id,
            ));
        }
    } else if !company.allowed_cidrs.is_empty() {
        // an allow-list with no resolvable peer fails closed
        return Err(ApiError::new(
            GatewayError::Forbidden("Peer address unavailable for allow-list check".to_string()),
            request_id,
        ));
    }

    request
        .extensions_mut()
        .insert(AuthCompany(Arc::new(company)));
    request.extensions_mut().insert(RequestId(request_id));
    Ok(next.run(request).await)
}

/// Operator claims for the admin surface
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OperatorClaims {
    pub sub: String,
    pub profile: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct Operator(pub OperatorClaims);

/// Middleware for the admin surface: verifies `X-Operator-Token` (HS256,
/// same signing secret family as break-glass sessions)
pub async fn require_operator(
    State(ctx): State<Arc<ApiContext>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use secrecy::ExposeSecret;

    let request_id = request_id_from(request.headers());
    let token = request
        .headers()
        .get("X-Operator-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                GatewayError::Unauthorized("Missing X-Operator-Token header".to_string()),
                request_id.clone(),
            )
        })?;

    let claims = decode::<OperatorClaims>(
        token,
        &DecodingKey::from_secret(ctx.security.break_glass_secret.expose_secret().as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        ApiError::new(
            GatewayError::Unauthorized(format!("Invalid operator token: {}", e)),
            request_id.clone(),
        )
    })?
    .claims;

    request.extensions_mut().insert(Operator(claims));
    request.extensions_mut().insert(RequestId(request_id));
    Ok(next.run(request).await)
}
