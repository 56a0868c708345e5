//! REST API layer: route handlers, DTOs, OpenAPI document and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "session-hub",
        description = "Multi-device messaging session supervisor with a WebSocket event stream at `/ws`."
    ),
    paths(
        handlers::system::health_handler,
        handlers::session::list_sessions,
        handlers::device::list_devices,
        handlers::device::connect_device,
        handlers::device::send_message,
        handlers::device::remove_device,
    ),
    components(schemas(
        dto::HealthResponse,
        dto::SessionDto,
        dto::SessionListResponse,
        dto::DeviceDto,
        dto::DeviceListResponse,
        dto::RemoveDeviceResponse,
        dto::SendMessageRequest,
        dto::SendMessageResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Sessions", description = "Device session state"),
        (name = "Devices", description = "Stored devices"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
