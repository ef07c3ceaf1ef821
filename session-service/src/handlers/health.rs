use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Liveness plus a store round trip
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "service": state.config.service_name })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "service": state.config.service_name })),
            )
        }
    }
}
