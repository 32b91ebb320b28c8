/// Mailgate API - ingestion and read surface
///
/// Versioned under `/v1`. The partner surface authenticates with
/// `X-API-Key`; the admin surface with `X-Operator-Token`.
pub mod api;
pub mod auth;
pub mod context;
pub mod error;
pub mod middleware;

pub use context::ApiContext;
pub use error::ApiError;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use mailgate_core::constants::MAX_BODY_BYTES;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Builds the full application router
pub fn router(ctx: Arc<ApiContext>) -> Router {
    let partner = Router::new()
        .route("/v1/email/send", post(api::send::handler))
        .route("/v1/emails", get(api::emails::list))
        .route("/v1/emails/{id}", get(api::emails::detail))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_api_key,
        ));

    let admin = Router::new()
        .route(
            "/v1/admin/companies/{id}/approve",
            post(api::admin::approve_company),
        )
        .route(
            "/v1/admin/companies/{id}/reject",
            post(api::admin::reject_company),
        )
        .route(
            "/v1/admin/companies/{id}/suspend",
            post(api::admin::suspend_company),
        )
        .route("/v1/admin/domains", post(api::admin::onboard_domain))
        .route(
            "/v1/admin/domains/{id}/verify",
            post(api::admin::verify_domain),
        )
        .route("/v1/admin/dlq", get(api::admin::list_dlq))
        .route("/v1/break-glass", post(api::breakglass::issue))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_operator,
        ));

    Router::new()
        .route("/health", get(api::health::handler))
        .merge(partner)
        .merge(admin)
        // bodies over 1 MiB are refused before JSON parsing
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            middleware::metrics::track_requests,
        ))
        .layer(axum::middleware::from_fn(middleware::logging::log_requests))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}
