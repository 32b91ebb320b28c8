/// POST /v1/break-glass: audited elevation to unmasked PII
use crate::auth::{Operator, RequestId};
use crate::context::ApiContext;
use crate::error::ApiError;
use axum::extract::{Extension, State};
use axum::{Json, http::StatusCode};
use mailgate_core::constants::BREAK_GLASS_SESSION_SECONDS;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassRequest {
    /// Signed justification, at least 20 characters
    pub justification: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassResponse {
    pub session_token: String,
    pub expires_in_seconds: u64,
}

pub async fn issue(
    State(ctx): State<Arc<ApiContext>>,
    Extension(Operator(operator)): Extension<Operator>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<BreakGlassRequest>,
) -> Result<(StatusCode, Json<BreakGlassResponse>), ApiError> {
    let token = ctx
        .break_glass
        .issue(&operator.sub, &operator.profile, &request.justification)
        .map_err(|e| ApiError::new(e, request_id.clone()))?;

    info!(
        target: "audit",
        user = %operator.sub,
        "Break-glass session opened"
    );

    Ok((
        StatusCode::CREATED,
        Json(BreakGlassResponse {
            session_token: token,
            expires_in_seconds: BREAK_GLASS_SESSION_SECONDS,
        }),
    ))
}
