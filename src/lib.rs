//! # session-hub
//!
//! Multi-device messaging session supervisor with a WebSocket event
//! broadcast hub.
//!
//! The gateway keeps one protocol client session per stored device,
//! reconnects every stored device at boot, purges devices whose session is
//! no longer valid, and republishes every inbound protocol event to any
//! number of streaming subscribers. The messaging protocol itself lives
//! behind [`protocol::ProtocolClient`]; this crate is a coordination layer.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Stream (ws/)
//!     │
//!     ├── SessionSupervisor, StartupReconciler, ShutdownCoordinator (service/)
//!     ├── SubscriberRegistry (domain/)
//!     │
//!     ├── ProtocolClient / BridgeClient (protocol/)
//!     │
//!     └── SQLite Device Store (persistence/)
//! ```
//!
//! ## Lifecycle
//!
//! 1. Open the device store (failure here stops the process).
//! 2. Start serving HTTP and `/ws`.
//! 3. [`service::StartupReconciler`] brings every stored device online.
//! 4. On `SIGINT`/`SIGTERM`/`SIGQUIT`, [`service::ShutdownCoordinator`]
//!    closes all streams and disconnects every session exactly once.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod service;
pub mod ws;
