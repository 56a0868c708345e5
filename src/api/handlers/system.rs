//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::HealthResponse;
use crate::app_state::AppState;

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp, connected session count and open stream count.",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.supervisor.is_shutting_down().await {
        "shutting_down"
    } else {
        "healthy"
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_sessions: state.supervisor.active_count().await,
            subscribers: state.subscribers.len(),
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
