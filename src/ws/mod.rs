//! WebSocket layer: the streaming event subscription.
//!
//! The WebSocket endpoint at `/ws` registers one subscriber per connection
//! and forwards every broadcast event that passes the connection's device
//! filter.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
