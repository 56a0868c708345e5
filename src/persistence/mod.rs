//! Persistence layer: durable storage of paired devices.
//!
//! Provides the [`DeviceStore`] trait used by startup and the session
//! supervisor. [`SqliteDeviceStore`] is the production implementation
//! backed by `sqlx`; [`MemoryDeviceStore`] keeps everything in process.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

pub use memory::MemoryDeviceStore;
pub use sqlite::SqliteDeviceStore;

use crate::domain::{Device, DeviceId};
use crate::error::GatewayError;

/// Durable storage of device credentials, keyed by [`DeviceId`].
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Returns every stored device, oldest registration first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if the store is unreachable.
    async fn list_devices(&self) -> Result<Vec<Device>, GatewayError>;

    /// Returns a single device, or `None` if it is not stored.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError>;

    /// Inserts or replaces a device.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn save_device(&self, device: &Device) -> Result<(), GatewayError>;

    /// Deletes a device. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn delete_device(&self, id: &DeviceId) -> Result<bool, GatewayError>;
}
