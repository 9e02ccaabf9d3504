use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status plus the primary queue depth when reachable.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let queue_depth = state.queue.depth().await.ok();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "screening-api",
        "queue_depth": queue_depth,
    }))
}
