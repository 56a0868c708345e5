//! Registry of open event streams and the fan-out over them.
//!
//! [`SubscriberRegistry`] keeps every active [`Subscriber`] in a map keyed
//! by [`SubscriberId`] behind a single [`std::sync::Mutex`]. The lock is
//! synchronous on purpose: protocol clients deliver events through plain
//! callbacks, and [`SubscriberRegistry::broadcast`] must be callable from
//! them without an executor.
//!
//! # Fan-out
//!
//! ```text
//! broadcast(event)
//!     │  lock → snapshot senders → unlock
//!     ├──► try_send ──► [queue 1] ──► stream 1
//!     ├──► try_send ──► [queue 2] ──► stream 2   (full → dropped)
//!     └──► try_send ──► [queue N] ──► stream N
//!        lock → unregister failed subscribers → unlock
//! ```
//!
//! Sends never block: each subscriber owns a bounded queue, and a queue that
//! is full or whose receiver is gone gets its subscriber removed after the
//! pass. One slow stream never stalls the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::BroadcastEvent;

/// Handle identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Creates a new random `SubscriberId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving half handed to the owner of a stream.
pub type EventReceiver = mpsc::Receiver<Arc<BroadcastEvent>>;

/// One external consumer's open stream.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Arc<BroadcastEvent>>,
    registered_at: DateTime<Utc>,
}

impl Subscriber {
    /// Creates a subscriber with a bounded queue of `capacity` events
    /// (minimum 1) and returns it with the receiving end.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            id: SubscriberId::new(),
            sender,
            registered_at: Utc::now(),
        };
        (subscriber, receiver)
    }

    /// Returns the subscriber's handle identity.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Returns when the subscriber was created.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

/// Outcome of a single [`SubscriberRegistry::broadcast`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers that failed and were unregistered.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct Inner {
    subscribers: HashMap<SubscriberId, Subscriber>,
    closed: bool,
}

/// Thread-safe set of active stream subscribers.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    inner: Mutex<Inner>,
}

impl SubscriberRegistry {
    /// Creates an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never leave the map half-updated; poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a subscriber with the given queue capacity and registers it.
    #[must_use]
    pub fn subscribe(&self, capacity: usize) -> (SubscriberId, EventReceiver) {
        let (subscriber, receiver) = Subscriber::new(capacity);
        let id = subscriber.id();
        self.register(subscriber);
        (id, receiver)
    }

    /// Adds a subscriber. Registering the same handle twice keeps one entry.
    ///
    /// After [`close`](Self::close) the subscriber is dropped immediately, so
    /// its stream ends without receiving anything.
    pub fn register(&self, subscriber: Subscriber) {
        let mut inner = self.lock();
        if inner.closed {
            tracing::debug!(subscriber = %subscriber.id, "registry closed, rejecting subscriber");
            return;
        }
        let id = subscriber.id;
        if inner.subscribers.insert(id, subscriber).is_none() {
            tracing::debug!(subscriber = %id, total = inner.subscribers.len(), "subscriber registered");
        }
    }

    /// Removes a subscriber. No-op if it is not registered.
    pub fn unregister(&self, id: SubscriberId) {
        let mut inner = self.lock();
        if inner.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, total = inner.subscribers.len(), "subscriber unregistered");
        }
    }

    /// Returns `true` if at least one subscriber is registered.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        !self.lock().subscribers.is_empty()
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Returns `true` if no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().subscribers.is_empty()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Sends `event` to every registered subscriber.
    ///
    /// Subscribers whose queue is full or whose stream is gone are
    /// unregistered after the pass. Never fails and never blocks.
    pub fn broadcast(&self, event: BroadcastEvent) -> BroadcastReport {
        let targets: Vec<(SubscriberId, mpsc::Sender<Arc<BroadcastEvent>>)> = {
            let inner = self.lock();
            if inner.closed {
                return BroadcastReport::default();
            }
            inner
                .subscribers
                .values()
                .map(|s| (s.id, s.sender.clone()))
                .collect()
        };
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let event = Arc::new(event);
        let mut failed = Vec::new();
        for (id, sender) in &targets {
            match sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %id, event_id = %event.id, "subscriber queue full, dropping subscriber");
                    failed.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = %id, "subscriber stream closed, dropping subscriber");
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            let mut inner = self.lock();
            for id in &failed {
                inner.subscribers.remove(id);
            }
        }

        let report = BroadcastReport {
            delivered: targets.len().saturating_sub(failed.len()),
            dropped: failed.len(),
        };
        tracing::trace!(
            device_id = %event.device_id,
            kind = event.kind(),
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast event"
        );
        report
    }

    /// Stops all further broadcasts and drops every subscriber.
    ///
    /// Open streams observe the end of their queue once they have drained
    /// what was already delivered.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        let dropped = inner.subscribers.len();
        inner.subscribers.clear();
        tracing::info!(dropped, "subscriber registry closed");
    }
}
