//! In-memory device store.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::DeviceStore;
use crate::domain::{Device, DeviceId};
use crate::error::GatewayError;

/// Device store kept in process memory.
///
/// Preserves insertion order. Data is lost on restart, which makes it
/// useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<Vec<Device>>,
}

impl MemoryDeviceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `devices`.
    #[must_use]
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Returns `true` if the device is stored.
    #[must_use]
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|d| &d.id == id)
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn list_devices(&self) -> Result<Vec<Device>, GatewayError> {
        Ok(self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError> {
        Ok(self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| &d.id == id)
            .cloned())
    }

    async fn save_device(&self, device: &Device) -> Result<(), GatewayError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device.clone(),
            None => devices.push(device.clone()),
        }
        Ok(())
    }

    async fn delete_device(&self, id: &DeviceId) -> Result<bool, GatewayError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let before = devices.len();
        devices.retain(|d| &d.id != id);
        Ok(devices.len() != before)
    }
}
