//! Shared harness for the end-to-end tests: an in-process gateway bound to
//! an ephemeral port with a mock protocol client factory.

#![allow(dead_code, clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use session_hub::app_state::AppState;
use session_hub::domain::{Device, DeviceId, SubscriberRegistry};
use session_hub::persistence::DeviceStore;
use session_hub::protocol::{
    ClientFactory, EventHandler, OutgoingMessage, ProtocolClient, ProtocolError, ProtocolEvent,
    SyncCriteria,
};
use session_hub::server::build_app;
use session_hub::service::{SessionSupervisor, StartupReconciler, StartupReport};

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockClient {
    device_id: DeviceId,
    connect_error: Option<ProtocolError>,
    handler: Mutex<Option<EventHandler>>,
    disconnects: AtomicUsize,
    sent: Mutex<Vec<OutgoingMessage>>,
}

#[async_trait]
impl ProtocolClient for MockClient {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    fn set_event_handler(&self, handler: EventHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        match &self.connect_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch_state(&self, _criteria: &SyncCriteria) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<String, ProtocolError> {
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        sent.push(message.clone());
        Ok(format!("MOCK{}", sent.len()))
    }
}

/// Creates [`MockClient`]s; a scripted failure applies to the next connect
/// of that device only.
#[derive(Default)]
pub struct MockFactory {
    failures: Mutex<HashMap<DeviceId, ProtocolError>>,
    clients: Mutex<HashMap<DeviceId, Arc<MockClient>>>,
}

impl ClientFactory for MockFactory {
    fn create(&self, device: &Device) -> Arc<dyn ProtocolClient> {
        let connect_error = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&device.id);
        let client = Arc::new(MockClient {
            device_id: device.id.clone(),
            connect_error,
            handler: Mutex::new(None),
            disconnects: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        });
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id.clone(), Arc::clone(&client));
        client
    }
}

impl MockFactory {
    pub fn fail_once(&self, id: &str, err: ProtocolError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(DeviceId::from(id), err);
    }

    fn client(&self, id: &str) -> Option<Arc<MockClient>> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&DeviceId::from(id))
            .cloned()
    }

    /// Pushes `event` through the device's installed handler.
    pub fn emit(&self, id: &str, event: ProtocolEvent) -> bool {
        let Some(client) = self.client(id) else {
            return false;
        };
        let handler = client
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    /// Messages sent through the device's current client.
    pub fn sent(&self, id: &str) -> Vec<OutgoingMessage> {
        self.client(id).map_or_else(Vec::new, |c| {
            c.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        })
    }

    pub fn disconnects(&self, id: &str) -> usize {
        self.client(id)
            .map_or(0, |c| c.disconnects.load(Ordering::SeqCst))
    }
}

pub struct Harness {
    pub addr: SocketAddr,
    pub store: Arc<dyn DeviceStore>,
    pub factory: Arc<MockFactory>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub supervisor: Arc<SessionSupervisor>,
    pub startup: StartupReport,
}

impl Harness {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Waits until the registry holds `n` subscribers.
    pub async fn wait_for_subscribers(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        while self.subscribers.len() != n {
            if tokio::time::Instant::now() > deadline {
                panic!("expected {n} subscribers, have {}", self.subscribers.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Runs startup reconciliation over `store` and serves the gateway on an
/// ephemeral local port.
pub async fn boot(store: Arc<dyn DeviceStore>, factory: MockFactory) -> Harness {
    let factory = Arc::new(factory);
    let subscribers = Arc::new(SubscriberRegistry::new());
    let supervisor = Arc::new(
        SessionSupervisor::new(
            Arc::clone(&store),
            Arc::clone(&factory) as Arc<dyn ClientFactory>,
            Arc::clone(&subscribers),
        )
        .with_disconnect_timeout(Duration::from_millis(500)),
    );
    let startup = StartupReconciler::new(Arc::clone(&supervisor)).run().await;

    let app = build_app(AppState {
        supervisor: Arc::clone(&supervisor),
        subscribers: Arc::clone(&subscribers),
        subscriber_buffer: 64,
    });
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Harness {
        addr,
        store,
        factory,
        subscribers,
        supervisor,
        startup,
    }
}
