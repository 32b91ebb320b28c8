/// Request metrics middleware
use crate::context::ApiContext;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use mailgate_core::services::metrics::{MetricUnit, MetricsService as _};
use std::sync::Arc;
use std::time::Instant;

pub async fn track_requests(
    State(ctx): State<Arc<ApiContext>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status_class = format!("{}xx", response.status().as_u16() / 100);
    ctx.metrics
        .record_counter(
            "HttpRequests",
            1.0,
            &[("Path", path.as_str()), ("Status", status_class.as_str())],
        )
        .await;
    ctx.metrics
        .record_histogram(
            "HttpRequestDuration",
            started.elapsed().as_millis() as f64,
            MetricUnit::Millis,
            &[("Path", path.as_str())],
        )
        .await;
    response
}
