//! session-hub server entry point.
//!
//! Opens the device store, starts the HTTP/WebSocket server, reconnects
//! stored devices and runs until a termination signal arrives.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use session_hub::app_state::AppState;
use session_hub::config::{GatewayConfig, LogFormat};
use session_hub::domain::SubscriberRegistry;
use session_hub::persistence::{DeviceStore, SqliteDeviceStore};
use session_hub::protocol::{BridgeClientFactory, ClientFactory, SyncCriteria};
use session_hub::server::build_app;
use session_hub::service::{
    SessionSupervisor, ShutdownCoordinator, ShutdownSignal, StartupReconciler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting session-hub");

    // Signals are queued from here on, including during startup
    let mut signal = ShutdownSignal::listen().context("failed to register signal handlers")?;

    // Device store; the only fatal startup dependency
    let store = Arc::new(
        SqliteDeviceStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_connect_timeout(),
        )
        .await
        .context("failed to open device store")?,
    );

    // Build domain and service layers
    let subscribers = Arc::new(SubscriberRegistry::new());
    let factory: Arc<dyn ClientFactory> = Arc::new(BridgeClientFactory::new(
        config.protocol_bridge_url.clone(),
        config.connect_timeout(),
    ));
    let supervisor = Arc::new(
        SessionSupervisor::new(
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            factory,
            Arc::clone(&subscribers),
        )
        .with_post_connect_sync(config.post_connect_sync.then(SyncCriteria::post_connect))
        .with_disconnect_timeout(config.shutdown_disconnect_timeout()),
    );

    let app = build_app(AppState {
        supervisor: Arc::clone(&supervisor),
        subscribers: Arc::clone(&subscribers),
        subscriber_buffer: config.subscriber_buffer,
    });

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    // Reconnect stored devices; a signal may cut this short
    let reconciler = StartupReconciler::new(Arc::clone(&supervisor));
    let mut startup = tokio::spawn(async move { reconciler.run().await });
    let early_signal = tokio::select! {
        done = &mut startup => {
            if let Err(e) = done {
                tracing::error!(error = %e, "startup task failed");
            }
            tracing::info!("gateway ready");
            None
        }
        name = signal.recv() => Some(name),
    };
    let name = match early_signal {
        Some(name) => name,
        None => signal.recv().await,
    };
    tracing::info!(signal = name, "shutdown signal received");

    ShutdownCoordinator::new(Arc::clone(&supervisor), Arc::clone(&subscribers))
        .shutdown()
        .await;

    // Connects still in flight observe the shutdown and stop
    if early_signal.is_some() {
        match startup.await {
            Ok(report) => tracing::info!(
                connected = report.connected,
                "startup interrupted by shutdown"
            ),
            Err(e) => tracing::error!(error = %e, "startup task failed"),
        }
    }

    let _ = stop_tx.send(());
    server
        .await
        .context("server task panicked")?
        .context("server error")?;

    store.close().await;
    tracing::info!("session-hub stopped");
    Ok(())
}
