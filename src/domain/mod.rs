//! Domain layer: device identity, session state and the broadcast hub.
//!
//! This module contains the server-side domain model: the device
//! identifier used as the key everywhere, the persisted device record,
//! the per-device session state machine, the event envelope fanned out
//! to subscribers, and the registry of open subscriber streams.

pub mod broadcast_event;
pub mod device;
pub mod device_id;
pub mod session;
pub mod subscriber_registry;

pub use broadcast_event::BroadcastEvent;
pub use device::Device;
pub use device_id::DeviceId;
pub use session::{ConnectionStatus, Session};
pub use subscriber_registry::{
    BroadcastReport, EventReceiver, Subscriber, SubscriberId, SubscriberRegistry,
};
