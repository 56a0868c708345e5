//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::SubscriberRegistry;
use crate::service::SessionSupervisor;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Supervisor owning the device sessions.
    pub supervisor: Arc<SessionSupervisor>,
    /// Registry of open event streams.
    pub subscribers: Arc<SubscriberRegistry>,
    /// Events buffered per stream before a slow subscriber is dropped.
    pub subscriber_buffer: usize,
}
