/// API error envelope
///
/// Every error response carries
/// `{error: {code, message, requestId, timestamp, details?}}` with codes
/// from the gateway taxonomy.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mailgate_core::error::GatewayError;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub inner: GatewayError,
    pub request_id: String,
    pub details: Vec<FieldError>,
}

impl ApiError {
    pub fn new(inner: GatewayError, request_id: impl Into<String>) -> Self {
        Self {
            inner,
            request_id: request_id.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = details;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut error = json!({
            "code": self.inner.code(),
            "message": self.inner.to_string(),
            "requestId": self.request_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if !self.details.is_empty() {
            error["details"] = serde_json::to_value(&self.details).unwrap_or_default();
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        // backpressure responses tell clients when to come back
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("5"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let err = ApiError::new(GatewayError::Validation("bad subject".into()), "req-1")
            .with_details(vec![FieldError {
                field: "subject".into(),
                message: "too long".into(),
                value: None,
            }]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_retry_after_on_503() {
        let err = ApiError::new(GatewayError::QueueFull("pressure".into()), "req-2");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("Retry-After"));
    }
}
