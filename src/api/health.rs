use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness plus live session and buffer counts.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.sessions.stats();
    Json(json!({
        "status": "healthy",
        "active_requests": stats.active_requests,
        "total_buffers": stats.total_buffers,
        "config_loaded": !state.fixes.snapshot().is_empty(),
        "target_host": state.config.server.target_url,
    }))
}
