//! Scripted protocol clients for service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Device, DeviceId};
use crate::protocol::{
    ClientFactory, EventHandler, OutgoingMessage, ProtocolClient, ProtocolError, ProtocolEvent,
    SyncCriteria,
};

/// Behaviour of one scripted device.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    connect_error: Option<ProtocolError>,
    connect_delay: Option<Duration>,
    disconnect_delay: Option<Duration>,
    sync_error: bool,
    send_error: Option<ProtocolError>,
}

impl Script {
    pub(crate) fn failing(err: ProtocolError) -> Self {
        Self {
            connect_error: Some(err),
            ..Self::default()
        }
    }

    pub(crate) fn with_sync_error(mut self) -> Self {
        self.sync_error = true;
        self
    }

    pub(crate) fn with_send_error(mut self, err: ProtocolError) -> Self {
        self.send_error = Some(err);
        self
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn with_disconnect_delay(mut self, delay: Duration) -> Self {
        self.disconnect_delay = Some(delay);
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    syncs: AtomicUsize,
    disconnects: AtomicUsize,
    sends: AtomicUsize,
}

struct ScriptedClient {
    device_id: DeviceId,
    script: Script,
    counters: Arc<Counters>,
    handler: Arc<Mutex<Option<EventHandler>>>,
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    fn set_event_handler(&self, handler: EventHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        if let Some(delay) = self.script.connect_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.connect_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.script.disconnect_delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_state(&self, _criteria: &SyncCriteria) -> Result<(), ProtocolError> {
        self.counters.syncs.fetch_add(1, Ordering::SeqCst);
        if self.script.sync_error {
            Err(ProtocolError::Other("app state sync failed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn send_message(&self, _message: &OutgoingMessage) -> Result<String, ProtocolError> {
        if let Some(err) = &self.script.send_error {
            return Err(err.clone());
        }
        let n = self.counters.sends.fetch_add(1, Ordering::SeqCst);
        Ok(format!("MSG{n}"))
    }
}

/// Factory handing out [`ScriptedClient`]s and recording what they did.
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    scripts: Mutex<HashMap<DeviceId, Script>>,
    counters: Mutex<HashMap<DeviceId, Arc<Counters>>>,
    handlers: Mutex<HashMap<DeviceId, Arc<Mutex<Option<EventHandler>>>>>,
}

impl ScriptedFactory {
    pub(crate) fn script(&self, device_id: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(DeviceId::from(device_id), script);
    }

    fn counters_for(&self, device_id: &DeviceId) -> Arc<Counters> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(counters.entry(device_id.clone()).or_default())
    }

    pub(crate) fn created(&self, device_id: &DeviceId) -> usize {
        self.counters_for(device_id).created.load(Ordering::SeqCst)
    }

    pub(crate) fn syncs(&self, device_id: &DeviceId) -> usize {
        self.counters_for(device_id).syncs.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self, device_id: &DeviceId) -> usize {
        self.counters_for(device_id).disconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn sends(&self, device_id: &DeviceId) -> usize {
        self.counters_for(device_id).sends.load(Ordering::SeqCst)
    }

    /// Pushes an event through the device's installed handler.
    pub(crate) fn emit(&self, device_id: &DeviceId, event: ProtocolEvent) -> bool {
        let slot = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned();
        let handler = slot.and_then(|s| s.lock().unwrap_or_else(PoisonError::into_inner).clone());
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

impl ClientFactory for ScriptedFactory {
    fn create(&self, device: &Device) -> Arc<dyn ProtocolClient> {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device.id)
            .cloned()
            .unwrap_or_default();
        let counters = self.counters_for(&device.id);
        counters.created.fetch_add(1, Ordering::SeqCst);
        let handler = Arc::new(Mutex::new(None));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id.clone(), Arc::clone(&handler));
        Arc::new(ScriptedClient {
            device_id: device.id.clone(),
            script,
            counters,
            handler,
        })
    }
}
