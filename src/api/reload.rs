use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::fixes::ReloadOutcome;
use crate::state::AppState;

/// Re-read the fix configuration document and swap it in.
///
/// The document is read on the blocking pool.
pub async fn reload_handler(State(state): State<Arc<AppState>>) -> Response {
    let fixes = Arc::clone(&state.fixes);
    let message = match tokio::task::spawn_blocking(move || fixes.reload()).await {
        Ok(ReloadOutcome::Loaded) => {
            return Json(json!({
                "status": "success",
                "message": "Configuration reloaded",
            }))
            .into_response();
        }
        Ok(ReloadOutcome::FellBackToDefault(err)) => {
            tracing::error!(error = %err, "failed to reload fix configuration");
            format!("{err}; embedded default configuration is active")
        }
        Err(err) => {
            tracing::error!(error = %err, "fix configuration reload task failed");
            format!("reload task failed: {err}")
        }
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}
