//! Per-connection device filter.
//!
//! Every stream starts out receiving events from all devices. A client may
//! narrow it to a set of devices, mute single devices while still receiving
//! the rest, and widen it again with `"*"`. Filtering
//! happens on the connection's own task, after the registry has delivered
//! the event.

use std::collections::HashSet;

use crate::domain::DeviceId;

/// Wildcard accepted in `subscribe` commands.
pub const WILDCARD: &str = "*";

/// Tracks which devices a WebSocket client wants events from.
#[derive(Debug)]
pub struct DeviceFilter {
    /// Selected devices. Ignored while `all` is set.
    device_ids: HashSet<DeviceId>,
    /// Muted devices. Only consulted while `all` is set.
    excluded: HashSet<DeviceId>,
    /// Whether events from every device pass.
    all: bool,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            device_ids: HashSet::new(),
            excluded: HashSet::new(),
            all: true,
        }
    }
}

impl DeviceFilter {
    /// Creates a filter that passes every device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a `subscribe` command.
    ///
    /// The wildcard restores the pass-all state and forgets any muted
    /// devices. Otherwise the listed devices are added, and the first
    /// explicit subscription replaces the implicit pass-all.
    pub fn subscribe<S: AsRef<str>>(&mut self, ids: &[S]) {
        if ids.iter().any(|id| id.as_ref() == WILDCARD) {
            self.all = true;
            self.device_ids.clear();
            self.excluded.clear();
            return;
        }
        if ids.is_empty() {
            return;
        }
        self.all = false;
        self.excluded.clear();
        self.device_ids
            .extend(ids.iter().map(|id| DeviceId::new(id.as_ref())));
    }

    /// Applies an `unsubscribe` command.
    ///
    /// A narrowed filter drops the listed devices from its selection. A
    /// pass-all filter keeps passing everything except the listed devices.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, ids: &[S]) {
        for id in ids {
            let id = DeviceId::new(id.as_ref());
            if self.all {
                self.excluded.insert(id);
            } else {
                self.device_ids.remove(&id);
            }
        }
    }

    /// Returns `true` if events from `device_id` should be forwarded.
    #[must_use]
    pub fn matches(&self, device_id: &DeviceId) -> bool {
        if self.all {
            !self.excluded.contains(device_id)
        } else {
            self.device_ids.contains(device_id)
        }
    }

    /// Returns the number of explicitly selected devices.
    #[must_use]
    pub fn count(&self) -> usize {
        self.device_ids.len()
    }

    /// Returns the number of muted devices in pass-all mode.
    #[must_use]
    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    /// Returns `true` while the filter is in pass-all mode, muted devices
    /// aside.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.all
    }
}
