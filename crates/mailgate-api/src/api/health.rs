/// Health endpoint (no auth)
use crate::context::ApiContext;
use axum::Json;
use axum::extract::State;
use mailgate_core::services::queue::JobQueue as _;
use serde_json::{Value, json};
use std::sync::Arc;

pub async fn handler(State(ctx): State<Arc<ApiContext>>) -> Json<Value> {
    let queue = ctx.queue.depth().await;
    Json(json!({
        "status": if queue.is_ok() { "ok" } else { "degraded" },
        "version": mailgate_core::VERSION,
        "queue": queue.map(|d| json!({
            "waiting": d.waiting,
            "prioritized": d.prioritized,
            "delayed": d.delayed,
            "active": d.active,
        })).unwrap_or(json!(null)),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
