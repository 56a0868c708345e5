//! SQLite implementation of the device store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::DeviceStore;
use crate::domain::{Device, DeviceId};
use crate::error::GatewayError;

type DeviceRow = (String, Option<String>, String, DateTime<Utc>);

/// SQLite-backed device store using `sqlx::SqlitePool`.
#[derive(Debug, Clone)]
pub struct SqliteDeviceStore {
    pool: SqlitePool,
}

impl SqliteDeviceStore {
    /// Wraps an existing connection pool. The schema must already exist;
    /// see [`SqliteDeviceStore::init_schema`].
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database at `url` and creates the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if the database cannot
    /// be opened or the schema cannot be created.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Creates the `devices` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn init_schema(&self) -> Result<(), GatewayError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS devices (\
                device_id TEXT PRIMARY KEY NOT NULL, \
                display_name TEXT, \
                session_data TEXT NOT NULL, \
                registered_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Closes the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_device((id, display_name, session_data, registered_at): DeviceRow) -> Result<Device, GatewayError> {
    let session_data = serde_json::from_str(&session_data).map_err(|e| {
        GatewayError::PersistenceError(format!("corrupt session data for {id}: {e}"))
    })?;
    Ok(Device {
        id: DeviceId::new(id),
        display_name,
        session_data,
        registered_at,
    })
}

#[async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn list_devices(&self) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT device_id, display_name, session_data, registered_at FROM devices \
             ORDER BY registered_at ASC, device_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row_to_device(row) {
                Ok(device) => Some(device),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable device row");
                    None
                }
            })
            .collect())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT device_id, display_name, session_data, registered_at FROM devices \
             WHERE device_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        row.map(row_to_device).transpose()
    }

    async fn save_device(&self, device: &Device) -> Result<(), GatewayError> {
        let session_data = serde_json::to_string(&device.session_data)
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO devices (device_id, display_name, session_data, registered_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT(device_id) DO UPDATE SET \
             display_name = excluded.display_name, session_data = excluded.session_data",
        )
        .bind(device.id.as_str())
        .bind(device.display_name.as_deref())
        .bind(session_data)
        .bind(device.registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        Ok(())
    }

    async fn delete_device(&self, id: &DeviceId) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
