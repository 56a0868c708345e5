//! Session listing.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{SessionDto, SessionListResponse};
use crate::app_state::AppState;

/// `GET /sessions` — Active sessions and failures of this boot cycle.
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "List sessions",
    description = "Returns the sessions in the active set plus the devices that failed to connect since the gateway started.",
    responses(
        (status = 200, description = "Session overview", body = SessionListResponse),
    )
)]
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.supervisor.sessions().await;
    let failures = state.supervisor.failures().await;
    Json(SessionListResponse {
        active: active.into_iter().map(SessionDto::from).collect(),
        failures: failures.into_iter().map(SessionDto::from).collect(),
    })
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sessions", get(list_sessions))
}
