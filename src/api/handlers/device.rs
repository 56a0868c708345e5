//! Device handlers: list, connect, send, log out.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{
    DeviceDto, DeviceListResponse, RemoveDeviceResponse, SendMessageRequest,
    SendMessageResponse, SessionDto,
};
use crate::app_state::AppState;
use crate::domain::DeviceId;
use crate::error::{ErrorResponse, GatewayError};
use crate::protocol::OutgoingMessage;

/// `GET /devices` — List persisted devices.
///
/// # Errors
///
/// Returns [`GatewayError::PersistenceError`] if the store cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    tag = "Devices",
    summary = "List devices",
    description = "Returns every device in the device store with its current connection state.",
    responses(
        (status = 200, description = "Device list", body = DeviceListResponse),
        (status = 500, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let devices = state.supervisor.store().list_devices().await?;
    let mut data = Vec::with_capacity(devices.len());
    for device in devices {
        let connected = state.supervisor.is_active(&device.id).await;
        data.push(DeviceDto::new(device, connected));
    }
    Ok(Json(DeviceListResponse {
        total: data.len(),
        data,
    }))
}

/// `POST /devices/{device_id}/connect` — Bring a stored device online.
///
/// # Errors
///
/// Returns [`GatewayError`] if the device is unknown, already active, the
/// gateway is shutting down, or the connect fails.
#[utoipa::path(
    post,
    path = "/api/v1/devices/{device_id}/connect",
    tag = "Devices",
    summary = "Connect device",
    description = "Loads the device from the store and connects it. An invalid session (fatal failure) removes the device from the store.",
    params(("device_id" = String, Path, description = "Device identifier")),
    responses(
        (status = 200, description = "Device connected", body = SessionDto),
        (status = 404, description = "Device not stored", body = ErrorResponse),
        (status = 409, description = "Session already active", body = ErrorResponse),
        (status = 502, description = "Protocol connect failed", body = ErrorResponse),
        (status = 503, description = "Gateway shutting down", body = ErrorResponse),
    )
)]
pub async fn connect_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let device_id = parse_device_id(device_id)?;
    let session = state.supervisor.connect_stored(&device_id).await?;
    Ok((StatusCode::OK, Json(SessionDto::from(session))))
}

/// `POST /devices/{device_id}/messages` — Send a text message.
///
/// # Errors
///
/// Returns [`GatewayError`] if the recipient is empty, the device is not
/// connected, or the protocol client rejects the message.
#[utoipa::path(
    post,
    path = "/api/v1/devices/{device_id}/messages",
    tag = "Devices",
    summary = "Send message",
    description = "Sends a text message from a connected device. Delivery and read receipts arrive on the `/ws` event stream.",
    params(("device_id" = String, Path, description = "Device identifier")),
    request_body = SendMessageRequest,
    responses(
        (status = 202, description = "Message handed to the protocol client", body = SendMessageResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Device not connected", body = ErrorResponse),
        (status = 502, description = "Protocol send failed", body = ErrorResponse),
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let device_id = parse_device_id(device_id)?;
    let message = OutgoingMessage {
        to: req.to,
        text: req.text,
    };
    let message_id = state.supervisor.send_message(&device_id, &message).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SendMessageResponse {
            device_id: device_id.into(),
            message_id,
            to: message.to,
            sent_at: Utc::now(),
        }),
    ))
}

/// `DELETE /devices/{device_id}` — Log a device out.
///
/// Tears down its session if connected and deletes it from the store.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the device is not stored,
/// [`GatewayError::SessionAlreadyActive`] while it is still connecting, or
/// [`GatewayError::PersistenceError`] if the deletion fails.
#[utoipa::path(
    delete,
    path = "/api/v1/devices/{device_id}",
    tag = "Devices",
    summary = "Log out device",
    description = "Disconnects the device if it is connected and removes it from the device store.",
    params(("device_id" = String, Path, description = "Device identifier")),
    responses(
        (status = 200, description = "Device removed", body = RemoveDeviceResponse),
        (status = 404, description = "Device not stored", body = ErrorResponse),
        (status = 409, description = "Device still connecting", body = ErrorResponse),
    )
)]
pub async fn remove_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let device_id = parse_device_id(device_id)?;
    let was_connected = state.supervisor.is_active(&device_id).await;
    if !state.supervisor.remove_device(&device_id).await? {
        return Err(GatewayError::DeviceNotFound(device_id.to_string()));
    }
    Ok(Json(RemoveDeviceResponse {
        device_id: device_id.into(),
        was_connected,
    }))
}

fn parse_device_id(raw: String) -> Result<DeviceId, GatewayError> {
    if raw.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "device_id must not be empty".to_string(),
        ));
    }
    Ok(DeviceId::new(raw))
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/{device_id}", delete(remove_device))
        .route("/devices/{device_id}/connect", post(connect_device))
        .route("/devices/{device_id}/messages", post(send_message))
}
