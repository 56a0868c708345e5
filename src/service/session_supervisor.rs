//! Session supervisor: owns the active protocol clients.
//!
//! [`SessionSupervisor`] brings devices online, wires each client's events
//! into the [`SubscriberRegistry`], applies the connect-failure policy and
//! tears sessions down again. The active set is a `RwLock<HashMap<..>>`
//! keyed by [`DeviceId`], which guarantees at most one session per device.
//!
//! # Bring-up
//!
//! ```text
//! reserve slot (Connecting) ─► create client ─► install event bridge ─► connect
//!        │                                                              │
//!        │                                        ok ◄──────────────────┤
//!        │                      post-connect sync (best-effort)          │
//!        │                      slot → Connected                         │
//!        │                                                    err ◄─────┘
//!        │                      fatal → purge device from store
//!        └──────────────────── release slot, record failure
//! ```
//!
//! A connect failure only ever affects its own device.
//!
//! [`connect_stored`](SessionSupervisor::connect_stored) reads the device
//! and reserves its slot under the table lock, and
//! [`remove_device`](SessionSupervisor::remove_device) deletes it from the
//! store under the same lock, so a log-out and a stored connect never
//! interleave.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::{
    BroadcastEvent, ConnectionStatus, Device, DeviceId, Session, SubscriberRegistry,
};
use crate::error::GatewayError;
use crate::persistence::DeviceStore;
use crate::protocol::{
    ClientFactory, EventHandler, FailureClass, OutgoingMessage, ProtocolClient, ProtocolError,
    ProtocolEvent, SyncCriteria,
};

/// A connected client removed from the active set, ready to be torn down.
pub struct ActiveClient {
    /// Device the client belongs to.
    pub device_id: DeviceId,
    /// Session snapshot at the time the client left the active set.
    pub session: Session,
    /// The protocol client.
    pub client: Arc<dyn ProtocolClient>,
}

impl fmt::Debug for ActiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveClient")
            .field("device_id", &self.device_id)
            .field("status", &self.session.status)
            .finish_non_exhaustive()
    }
}

/// Result of [`ActiveClient::tear_down`].
#[derive(Debug, Clone)]
pub struct DisconnectOutcome {
    /// Final session snapshot, in [`ConnectionStatus::Disconnected`] when
    /// the client was connected.
    pub session: Session,
    /// Whether the disconnect finished within the timeout.
    pub completed: bool,
}

impl ActiveClient {
    /// Disconnects the client, giving up after `timeout`.
    ///
    /// The session leaves the active set either way, so it is marked
    /// disconnected even when the client does not answer in time.
    pub async fn tear_down(mut self, timeout: Duration) -> DisconnectOutcome {
        let completed = tokio::time::timeout(timeout, self.client.disconnect())
            .await
            .is_ok();
        if completed {
            tracing::info!(device_id = %self.device_id, "device disconnected");
        } else {
            tracing::warn!(device_id = %self.device_id, ?timeout, "disconnect timed out");
        }
        if self.session.is_connected()
            && let Err(e) = self.session.transition(ConnectionStatus::Disconnected)
        {
            tracing::warn!(device_id = %self.device_id, error = %e, "could not mark session disconnected");
        }
        DisconnectOutcome {
            session: self.session,
            completed,
        }
    }
}

enum Slot {
    Connecting(Session),
    Connected {
        session: Session,
        client: Arc<dyn ProtocolClient>,
    },
}

impl Slot {
    fn session(&self) -> &Session {
        match self {
            Self::Connecting(session) | Self::Connected { session, .. } => session,
        }
    }
}

#[derive(Default)]
struct SessionTable {
    slots: HashMap<DeviceId, Slot>,
    failures: HashMap<DeviceId, Session>,
    shutting_down: bool,
}

impl SessionTable {
    /// Claims a `Connecting` slot for `device_id`.
    fn reserve(&mut self, device_id: &DeviceId) -> Result<Session, GatewayError> {
        if self.shutting_down {
            return Err(GatewayError::ShuttingDown);
        }
        if self.slots.contains_key(device_id) {
            return Err(GatewayError::SessionAlreadyActive(device_id.to_string()));
        }
        let mut session = Session::new(device_id.clone());
        session.transition(ConnectionStatus::Connecting)?;
        self.slots
            .insert(device_id.clone(), Slot::Connecting(session.clone()));
        Ok(session)
    }

    /// Removes a connected slot. A connecting slot stays in place.
    fn take_connected(&mut self, device_id: &DeviceId) -> Option<ActiveClient> {
        match self.slots.remove(device_id)? {
            Slot::Connected { session, client } => Some(ActiveClient {
                device_id: device_id.clone(),
                session,
                client,
            }),
            connecting @ Slot::Connecting(_) => {
                self.slots.insert(device_id.clone(), connecting);
                None
            }
        }
    }
}

/// Builds the callback that forwards a device's events to all subscribers.
///
/// Runs on the protocol client's task: it never blocks, and skips building
/// the envelope when nobody is listening.
fn event_bridge(device_id: DeviceId, subscribers: Arc<SubscriberRegistry>) -> EventHandler {
    Arc::new(move |event: ProtocolEvent| {
        if !subscribers.has_subscribers() {
            return;
        }
        subscribers.broadcast(BroadcastEvent::new(device_id.clone(), event));
    })
}

/// Owner of the active protocol client sessions.
pub struct SessionSupervisor {
    store: Arc<dyn DeviceStore>,
    factory: Arc<dyn ClientFactory>,
    subscribers: Arc<SubscriberRegistry>,
    sync_criteria: Option<SyncCriteria>,
    disconnect_timeout: Duration,
    table: RwLock<SessionTable>,
}

impl fmt::Debug for SessionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSupervisor")
            .field("sync_criteria", &self.sync_criteria)
            .field("disconnect_timeout", &self.disconnect_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionSupervisor {
    /// Creates a supervisor with an empty active set.
    ///
    /// Post-connect state sync is enabled with
    /// [`SyncCriteria::post_connect`]; see
    /// [`with_post_connect_sync`](Self::with_post_connect_sync).
    #[must_use]
    pub fn new(
        store: Arc<dyn DeviceStore>,
        factory: Arc<dyn ClientFactory>,
        subscribers: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            store,
            factory,
            subscribers,
            sync_criteria: Some(SyncCriteria::post_connect()),
            disconnect_timeout: Duration::from_secs(5),
            table: RwLock::new(SessionTable::default()),
        }
    }

    /// Sets the state sync requested after each successful connect, or
    /// disables it with `None`.
    #[must_use]
    pub fn with_post_connect_sync(mut self, criteria: Option<SyncCriteria>) -> Self {
        self.sync_criteria = criteria;
        self
    }

    /// Sets the time allowed for a single disconnect.
    #[must_use]
    pub const fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Returns the device store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    /// Returns the time allowed for a single disconnect.
    #[must_use]
    pub const fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    /// Connects a device and adds it to the active set.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ShuttingDown`] once shutdown has begun, including
    ///   when it begins while the connect is in flight.
    /// - [`GatewayError::SessionAlreadyActive`] if the device is already
    ///   connecting or connected.
    /// - [`GatewayError::ConnectFailed`] if the client fails to connect. A
    ///   [`FailureClass::Fatal`] failure has already purged the device from
    ///   the store when this is returned.
    pub async fn bring_up(&self, device: Device) -> Result<Session, GatewayError> {
        let session = self.table.write().await.reserve(&device.id)?;
        self.connect_reserved(device, session).await
    }

    /// Connects a device whose `Connecting` slot is already reserved.
    async fn connect_reserved(
        &self,
        device: Device,
        mut session: Session,
    ) -> Result<Session, GatewayError> {
        let device_id = device.id.clone();
        tracing::info!(%device_id, "connecting device");

        let client = self.factory.create(&device);
        client.set_event_handler(event_bridge(
            device_id.clone(),
            Arc::clone(&self.subscribers),
        ));

        if let Err(err) = client.connect().await {
            return Err(self.record_failure(session, err).await);
        }

        if let Some(criteria) = &self.sync_criteria
            && let Err(e) = client.fetch_state(criteria).await
        {
            tracing::warn!(%device_id, error = %e, "post-connect state sync failed");
        }

        let mut table = self.table.write().await;
        if table.shutting_down {
            table.slots.remove(&device_id);
            drop(table);
            tracing::warn!(%device_id, "shutdown began while connecting, disconnecting");
            let active = ActiveClient {
                device_id,
                session,
                client,
            };
            active.tear_down(self.disconnect_timeout).await;
            return Err(GatewayError::ShuttingDown);
        }
        if let Err(e) = session.transition(ConnectionStatus::Connected) {
            table.slots.remove(&device_id);
            return Err(e);
        }
        table.failures.remove(&device_id);
        table.slots.insert(
            device_id.clone(),
            Slot::Connected {
                session: session.clone(),
                client,
            },
        );
        drop(table);

        tracing::info!(%device_id, "device connected");
        Ok(session)
    }

    /// Applies the failure policy for a failed connect and releases the slot.
    async fn record_failure(&self, mut session: Session, err: ProtocolError) -> GatewayError {
        let device_id = session.device_id.clone();
        let class = err.class();
        let reason = err.to_string();
        tracing::error!(%device_id, error = %err, class = class.as_str(), "failed to connect device");

        if class == FailureClass::Fatal {
            tracing::warn!(%device_id, "removing invalid session from store");
            match self.store.delete_device(&device_id).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(%device_id, "device already absent from store"),
                Err(e) => {
                    tracing::error!(%device_id, error = %e, "failed to remove invalid session");
                }
            }
        }

        if let Err(e) = session.fail(reason.clone(), class) {
            tracing::warn!(%device_id, error = %e, "could not mark session failed");
        }
        let mut table = self.table.write().await;
        table.slots.remove(&device_id);
        table.failures.insert(device_id.clone(), session);

        GatewayError::ConnectFailed {
            device_id: device_id.to_string(),
            class,
            reason,
        }
    }

    /// Loads a device from the store and brings it up.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] if the device is not stored,
    /// a [`GatewayError::PersistenceError`] if the lookup fails, or any error
    /// of [`bring_up`](Self::bring_up).
    pub async fn connect_stored(&self, device_id: &DeviceId) -> Result<Session, GatewayError> {
        let (device, session) = {
            let mut table = self.table.write().await;
            let device = self
                .store
                .get_device(device_id)
                .await?
                .ok_or_else(|| GatewayError::DeviceNotFound(device_id.to_string()))?;
            let session = table.reserve(device_id)?;
            (device, session)
        };
        self.connect_reserved(device, session).await
    }

    /// Removes a connected device from the active set and disconnects it.
    ///
    /// Returns the final session snapshot, or `None` if the device was not
    /// connected. A device that is still connecting is left alone.
    pub async fn tear_down(&self, device_id: &DeviceId) -> Option<Session> {
        let active = self.table.write().await.take_connected(device_id)?;
        Some(active.tear_down(self.disconnect_timeout).await.session)
    }

    /// Deletes a device from the store and tears down its session (log out).
    ///
    /// Returns `true` if the device was stored.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::SessionAlreadyActive`] while the device is still
    ///   connecting; nothing is deleted.
    /// - [`GatewayError::PersistenceError`] if the deletion fails; the
    ///   session is left untouched.
    pub async fn remove_device(&self, device_id: &DeviceId) -> Result<bool, GatewayError> {
        let (existed, active) = {
            let mut table = self.table.write().await;
            if matches!(table.slots.get(device_id), Some(Slot::Connecting(_))) {
                return Err(GatewayError::SessionAlreadyActive(device_id.to_string()));
            }
            let existed = self.store.delete_device(device_id).await?;
            table.failures.remove(device_id);
            (existed, table.take_connected(device_id))
        };
        let was_active = active.is_some();
        if let Some(active) = active {
            active.tear_down(self.disconnect_timeout).await;
        }
        tracing::info!(%device_id, was_active, existed, "device removed");
        Ok(existed)
    }

    /// Sends a text message from a connected device.
    ///
    /// Returns the protocol message ID.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidRequest`] if the recipient is empty.
    /// - [`GatewayError::SessionNotConnected`] unless the device is connected.
    /// - [`GatewayError::SendFailed`] if the client rejects the message.
    pub async fn send_message(
        &self,
        device_id: &DeviceId,
        message: &OutgoingMessage,
    ) -> Result<String, GatewayError> {
        if message.to.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "recipient must not be empty".to_string(),
            ));
        }
        let client = match self.table.read().await.slots.get(device_id) {
            Some(Slot::Connected { client, .. }) => Arc::clone(client),
            _ => return Err(GatewayError::SessionNotConnected(device_id.to_string())),
        };
        let message_id =
            client
                .send_message(message)
                .await
                .map_err(|e| GatewayError::SendFailed {
                    device_id: device_id.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::info!(%device_id, %message_id, to = %message.to, "message sent");
        Ok(message_id)
    }

    /// Marks the supervisor as shutting down and removes every connected
    /// client from the active set.
    ///
    /// Later calls to [`bring_up`](Self::bring_up) fail with
    /// [`GatewayError::ShuttingDown`]; connects still in flight disconnect
    /// their own client when they finish.
    pub async fn drain(&self) -> Vec<ActiveClient> {
        let mut table = self.table.write().await;
        table.shutting_down = true;
        let slots = std::mem::take(&mut table.slots);
        let mut drained = Vec::with_capacity(slots.len());
        for (device_id, slot) in slots {
            match slot {
                Slot::Connected { session, client } => drained.push(ActiveClient {
                    device_id,
                    session,
                    client,
                }),
                connecting @ Slot::Connecting(_) => {
                    table.slots.insert(device_id, connecting);
                }
            }
        }
        drained
    }

    /// Returns `true` once [`drain`](Self::drain) has been called.
    pub async fn is_shutting_down(&self) -> bool {
        self.table.read().await.shutting_down
    }

    /// Returns the sessions in the active set, ordered by device.
    pub async fn sessions(&self) -> Vec<Session> {
        let table = self.table.read().await;
        let mut sessions: Vec<Session> = table.slots.values().map(|s| s.session().clone()).collect();
        sessions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        sessions
    }

    /// Returns the sessions that failed to connect during this boot cycle
    /// and have not connected since, ordered by device.
    pub async fn failures(&self) -> Vec<Session> {
        let table = self.table.read().await;
        let mut sessions: Vec<Session> = table.failures.values().cloned().collect();
        sessions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        sessions
    }

    /// Returns the number of connected sessions.
    pub async fn active_count(&self) -> usize {
        self.table
            .read()
            .await
            .slots
            .values()
            .filter(|s| s.session().is_connected())
            .count()
    }

    /// Returns `true` if the device is connected.
    pub async fn is_active(&self, device_id: &DeviceId) -> bool {
        self.table
            .read()
            .await
            .slots
            .get(device_id)
            .is_some_and(|s| s.session().is_connected())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryDeviceStore;
    use crate::service::testing::{Script, ScriptedFactory};

    struct Fixture {
        store: Arc<MemoryDeviceStore>,
        factory: Arc<ScriptedFactory>,
        subscribers: Arc<SubscriberRegistry>,
        supervisor: SessionSupervisor,
    }

    fn fixture(devices: &[&str]) -> Fixture {
        let store = Arc::new(MemoryDeviceStore::with_devices(
            devices
                .iter()
                .map(|id| Device::new(*id, serde_json::Value::Null))
                .collect(),
        ));
        let factory = Arc::new(ScriptedFactory::default());
        let subscribers = Arc::new(SubscriberRegistry::new());
        let supervisor = SessionSupervisor::new(
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            Arc::clone(&factory) as Arc<dyn ClientFactory>,
            Arc::clone(&subscribers),
        );
        Fixture {
            store,
            factory,
            subscribers,
            supervisor,
        }
    }

    fn device(id: &str) -> Device {
        Device::new(id, serde_json::Value::Null)
    }

    #[tokio::test]
    async fn successful_bring_up_is_connected() {
        let f = fixture(&["a"]);
        let Ok(session) = f.supervisor.bring_up(device("a")).await else {
            panic!("bring up failed");
        };
        assert_eq!(session.status, ConnectionStatus::Connected);
        assert!(f.supervisor.is_active(&DeviceId::from("a")).await);
        assert_eq!(f.supervisor.active_count().await, 1);
        assert_eq!(f.factory.syncs(&DeviceId::from("a")), 1);
    }

    #[tokio::test]
    async fn fatal_failure_purges_device() {
        let f = fixture(&["b"]);
        f.factory.script(
            "b",
            Script::failing(ProtocolError::from_message("server responded with 401")),
        );

        let result = f.supervisor.bring_up(device("b")).await;
        assert_eq!(
            result.as_ref().err().and_then(GatewayError::failure_class),
            Some(FailureClass::Fatal)
        );
        assert!(!f.store.contains(&DeviceId::from("b")));
        assert_eq!(f.supervisor.active_count().await, 0);

        let failures = f.supervisor.failures().await;
        let Some(failed) = failures.first() else {
            panic!("failure not recorded");
        };
        assert_eq!(failed.status, ConnectionStatus::Failed);
        assert_eq!(failed.failure_class, Some(FailureClass::Fatal));
    }

    #[tokio::test]
    async fn transient_failure_keeps_device() {
        let f = fixture(&["c"]);
        f.factory
            .script("c", Script::failing(ProtocolError::Network("connection reset".into())));

        let result = f.supervisor.bring_up(device("c")).await;
        assert_eq!(
            result.as_ref().err().and_then(GatewayError::failure_class),
            Some(FailureClass::Transient)
        );
        assert!(f.store.contains(&DeviceId::from("c")));
        assert!(!f.supervisor.is_active(&DeviceId::from("c")).await);
        assert!(f.supervisor.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn second_bring_up_is_rejected() {
        let f = fixture(&["a"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let result = f.supervisor.bring_up(device("a")).await;
        assert!(matches!(result, Err(GatewayError::SessionAlreadyActive(_))));
        assert_eq!(f.factory.created(&DeviceId::from("a")), 1);
    }

    #[tokio::test]
    async fn sync_failure_is_not_fatal() {
        let f = fixture(&["a"]);
        f.factory.script("a", Script::default().with_sync_error());
        let result = f.supervisor.bring_up(device("a")).await;
        assert!(result.is_ok());
        assert!(f.supervisor.is_active(&DeviceId::from("a")).await);
    }

    #[tokio::test]
    async fn sync_can_be_disabled() {
        let f = fixture(&["a"]);
        let supervisor = f.supervisor.with_post_connect_sync(None);
        assert!(supervisor.bring_up(device("a")).await.is_ok());
        assert_eq!(f.factory.syncs(&DeviceId::from("a")), 0);
    }

    #[tokio::test]
    async fn events_are_broadcast_with_device_tag() {
        let f = fixture(&["a"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let (_id, mut rx) = f.subscribers.subscribe(8);

        assert!(f.factory.emit(&DeviceId::from("a"), ProtocolEvent::Connected));
        let Some(event) = rx.recv().await else {
            panic!("no event");
        };
        assert_eq!(event.device_id, DeviceId::from("a"));
        assert_eq!(event.kind(), "connected");
    }

    #[tokio::test]
    async fn events_without_subscribers_are_skipped() {
        let f = fixture(&["a"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        assert!(f.factory.emit(&DeviceId::from("a"), ProtocolEvent::Connected));
        assert!(f.subscribers.is_empty());
    }

    #[tokio::test]
    async fn tear_down_disconnects_once() {
        let f = fixture(&["a"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let id = DeviceId::from("a");
        let Some(session) = f.supervisor.tear_down(&id).await else {
            panic!("connected device must tear down");
        };
        assert_eq!(session.status, ConnectionStatus::Disconnected);
        assert!(f.supervisor.tear_down(&id).await.is_none());
        assert_eq!(f.factory.disconnects(&id), 1);
        assert_eq!(f.supervisor.active_count().await, 0);
    }

    #[tokio::test]
    async fn remove_device_logs_out() {
        let f = fixture(&["a"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let id = DeviceId::from("a");
        assert!(matches!(f.supervisor.remove_device(&id).await, Ok(true)));
        assert!(!f.store.contains(&id));
        assert_eq!(f.factory.disconnects(&id), 1);
    }

    #[tokio::test]
    async fn connect_stored_requires_stored_device() {
        let f = fixture(&[]);
        let result = f.supervisor.connect_stored(&DeviceId::from("ghost")).await;
        assert!(matches!(result, Err(GatewayError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn retry_after_transient_failure_clears_failure() {
        let f = fixture(&["c"]);
        f.factory
            .script("c", Script::failing(ProtocolError::Timeout("connect".into())));
        assert!(f.supervisor.connect_stored(&DeviceId::from("c")).await.is_err());
        assert_eq!(f.supervisor.failures().await.len(), 1);

        f.factory.script("c", Script::default());
        assert!(f.supervisor.connect_stored(&DeviceId::from("c")).await.is_ok());
        assert!(f.supervisor.failures().await.is_empty());
    }

    #[tokio::test]
    async fn drain_rejects_new_sessions() {
        let f = fixture(&["a", "b"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let drained = f.supervisor.drain().await;
        assert_eq!(drained.len(), 1);
        assert!(f.supervisor.is_shutting_down().await);

        let result = f.supervisor.bring_up(device("b")).await;
        assert!(matches!(result, Err(GatewayError::ShuttingDown)));
    }

    #[tokio::test]
    async fn shutdown_during_connect_disconnects_new_client() {
        let f = fixture(&["slow"]);
        f.factory.script(
            "slow",
            Script::default().with_connect_delay(Duration::from_millis(200)),
        );
        let supervisor = Arc::new(f.supervisor);

        let pending = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.bring_up(device("slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(supervisor.drain().await.is_empty());

        let Ok(result) = pending.await else {
            panic!("task failed");
        };
        assert!(matches!(result, Err(GatewayError::ShuttingDown)));
        assert_eq!(f.factory.disconnects(&DeviceId::from("slow")), 1);
        assert!(supervisor.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_during_connect_bounds_the_disconnect() {
        let f = fixture(&["slow"]);
        f.factory.script(
            "slow",
            Script::default()
                .with_connect_delay(Duration::from_millis(100))
                .with_disconnect_delay(Duration::from_secs(3)),
        );
        let supervisor = Arc::new(
            f.supervisor
                .with_disconnect_timeout(Duration::from_millis(100)),
        );

        let started = tokio::time::Instant::now();
        let pending = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.bring_up(device("slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(supervisor.drain().await.is_empty());

        let Ok(result) = pending.await else {
            panic!("task failed");
        };
        assert!(matches!(result, Err(GatewayError::ShuttingDown)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(f.factory.disconnects(&DeviceId::from("slow")), 1);
    }

    #[tokio::test]
    async fn remove_while_connecting_is_rejected() {
        let f = fixture(&["slow"]);
        f.factory.script(
            "slow",
            Script::default().with_connect_delay(Duration::from_millis(200)),
        );
        let supervisor = Arc::new(f.supervisor);
        let id = DeviceId::from("slow");

        let pending = {
            let supervisor = Arc::clone(&supervisor);
            let id = id.clone();
            tokio::spawn(async move { supervisor.connect_stored(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let removed = supervisor.remove_device(&id).await;
        assert!(matches!(removed, Err(GatewayError::SessionAlreadyActive(_))));
        assert!(f.store.contains(&id));

        let Ok(result) = pending.await else {
            panic!("task failed");
        };
        assert!(result.is_ok());
        assert!(supervisor.is_active(&id).await);

        // Once connected, the log-out goes through and leaves nothing behind.
        assert!(matches!(supervisor.remove_device(&id).await, Ok(true)));
        assert!(!f.store.contains(&id));
        assert!(!supervisor.is_active(&id).await);
        assert_eq!(f.factory.disconnects(&id), 1);
    }

    fn hello() -> OutgoingMessage {
        OutgoingMessage {
            to: "34600333444@s.whatsapp.net".to_string(),
            text: "hola".to_string(),
        }
    }

    #[tokio::test]
    async fn send_requires_connected_session() {
        let f = fixture(&["a"]);
        let id = DeviceId::from("a");
        let result = f.supervisor.send_message(&id, &hello()).await;
        assert!(matches!(result, Err(GatewayError::SessionNotConnected(_))));

        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let Ok(message_id) = f.supervisor.send_message(&id, &hello()).await else {
            panic!("send failed");
        };
        assert_eq!(message_id, "MSG0");
        assert_eq!(f.factory.sends(&id), 1);
    }

    #[tokio::test]
    async fn send_failure_keeps_session() {
        let f = fixture(&["a"]);
        f.factory.script(
            "a",
            Script::default().with_send_error(ProtocolError::from_message(
                "failed to send usync query: websocket not connected",
            )),
        );
        let id = DeviceId::from("a");
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());

        let result = f.supervisor.send_message(&id, &hello()).await;
        assert!(matches!(result, Err(GatewayError::SendFailed { .. })));
        assert!(f.supervisor.is_active(&id).await);
        assert!(f.store.contains(&id));
    }

    #[tokio::test]
    async fn send_rejects_empty_recipient() {
        let f = fixture(&["a"]);
        assert!(f.supervisor.bring_up(device("a")).await.is_ok());
        let message = OutgoingMessage {
            to: " ".to_string(),
            text: "x".to_string(),
        };
        let result = f.supervisor.send_message(&DeviceId::from("a"), &message).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn removed_device_cannot_be_reconnected() {
        let f = fixture(&["a"]);
        let id = DeviceId::from("a");
        assert!(matches!(f.supervisor.remove_device(&id).await, Ok(true)));

        let result = f.supervisor.connect_stored(&id).await;
        assert!(matches!(result, Err(GatewayError::DeviceNotFound(_))));
        assert_eq!(f.factory.created(&id), 0);
        assert!(!f.supervisor.is_active(&id).await);
    }
}
