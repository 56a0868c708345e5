//! Boot-time reconnection of persisted devices.

use std::sync::Arc;

use serde::Serialize;

use super::SessionSupervisor;
use crate::protocol::FailureClass;

/// Counts gathered during one [`StartupReconciler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    /// Devices returned by the store.
    pub found: usize,
    /// Devices brought online.
    pub connected: usize,
    /// Devices whose session was invalid and were purged from the store.
    pub invalidated: usize,
    /// Devices that failed transiently and remain stored.
    pub failed: usize,
    /// Devices not attempted (already active, removed meanwhile, or shutdown
    /// began).
    pub skipped: usize,
}

/// Brings every persisted device online when the gateway starts.
#[derive(Debug)]
pub struct StartupReconciler {
    supervisor: Arc<SessionSupervisor>,
}

impl StartupReconciler {
    /// Creates a reconciler driving `supervisor`.
    #[must_use]
    pub fn new(supervisor: Arc<SessionSupervisor>) -> Self {
        Self { supervisor }
    }

    /// Enumerates stored devices and connects them one by one.
    ///
    /// Each device is re-read when its turn comes, so a device logged out
    /// while startup is running is skipped rather than revived.
    ///
    /// A store that cannot be read counts as empty: the gateway keeps
    /// serving so that new logins remain possible. Individual failures
    /// never stop the remaining devices from being attempted.
    pub async fn run(&self) -> StartupReport {
        let mut report = StartupReport::default();

        let devices = match self.supervisor.store().list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, "failed to load devices from store");
                Vec::new()
            }
        };

        if devices.is_empty() {
            tracing::warn!("no devices found, waiting for a new login");
            return report;
        }

        report.found = devices.len();
        tracing::info!(count = report.found, "devices found, connecting");

        for device in devices {
            let device_id = device.id;
            match self.supervisor.connect_stored(&device_id).await {
                Ok(_) => report.connected += 1,
                Err(e) => match e.failure_class() {
                    Some(FailureClass::Fatal) => report.invalidated += 1,
                    Some(FailureClass::Transient) => report.failed += 1,
                    None => {
                        tracing::warn!(%device_id, error = %e, "device skipped");
                        report.skipped += 1;
                    }
                },
            }
        }

        tracing::info!(
            connected = report.connected,
            invalidated = report.invalidated,
            failed = report.failed,
            skipped = report.skipped,
            "startup reconciliation complete"
        );
        report
    }
}
