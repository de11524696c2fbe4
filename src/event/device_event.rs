// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use serde::Serialize;

use crate::state::DeviceSnapshot;
use crate::types::DeviceKind;

/// Events emitted by the device registry.
///
/// These events notify subscribers about device lifecycle changes,
/// connection status, and state updates. All events carry the identifier
/// of the device they concern.
///
/// # Examples
///
/// ```
/// use homesync_lib::event::DeviceEvent;
/// use homesync_lib::types::DeviceKind;
///
/// let added = DeviceEvent::device_added("bulb_1", DeviceKind::Light);
/// assert!(added.is_lifecycle());
/// assert_eq!(added.device_id(), "bulb_1");
///
/// let lost = DeviceEvent::disconnected_with_error("bulb_1", "connection lost");
/// assert!(lost.is_connection());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A device was created and connected.
    DeviceAdded {
        /// The ID of the added device.
        device_id: String,
        /// Its kind.
        kind: DeviceKind,
    },

    /// A device was deleted.
    DeviceRemoved {
        /// The ID of the removed device.
        device_id: String,
    },

    /// Device connection state changed.
    ConnectionChanged {
        /// The ID of the device.
        device_id: String,
        /// Whether the device is now connected.
        connected: bool,
        /// Reason, when the session gave up.
        error: Option<String>,
    },

    /// Device state changed.
    ///
    /// Emitted after every local mutation and every inbound state message
    /// that changed something.
    StateChanged {
        /// The complete new state of the device.
        snapshot: DeviceSnapshot,
    },
}

impl DeviceEvent {
    /// Returns the device ID associated with this event.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::DeviceAdded { device_id, .. }
            | Self::DeviceRemoved { device_id }
            | Self::ConnectionChanged { device_id, .. } => device_id,
            Self::StateChanged { snapshot } => snapshot.device_id(),
        }
    }

    /// Returns `true` if this is a device lifecycle event (added/removed).
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::DeviceAdded { .. } | Self::DeviceRemoved { .. })
    }

    /// Returns `true` if this is a connection event.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionChanged { .. })
    }

    /// Returns `true` if this is a state change event.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }

    /// Creates a device added event.
    #[must_use]
    pub fn device_added(device_id: impl Into<String>, kind: DeviceKind) -> Self {
        Self::DeviceAdded {
            device_id: device_id.into(),
            kind,
        }
    }

    /// Creates a device removed event.
    #[must_use]
    pub fn device_removed(device_id: impl Into<String>) -> Self {
        Self::DeviceRemoved {
            device_id: device_id.into(),
        }
    }

    /// Creates a connected event.
    #[must_use]
    pub fn connected(device_id: impl Into<String>) -> Self {
        Self::ConnectionChanged {
            device_id: device_id.into(),
            connected: true,
            error: None,
        }
    }

    /// Creates a disconnected event.
    #[must_use]
    pub fn disconnected(device_id: impl Into<String>) -> Self {
        Self::ConnectionChanged {
            device_id: device_id.into(),
            connected: false,
            error: None,
        }
    }

    /// Creates a disconnected event with an error.
    #[must_use]
    pub fn disconnected_with_error(device_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ConnectionChanged {
            device_id: device_id.into(),
            connected: false,
            error: Some(error.into()),
        }
    }

    /// Creates a state changed event.
    #[must_use]
    pub fn state_changed(snapshot: impl Into<DeviceSnapshot>) -> Self {
        Self::StateChanged {
            snapshot: snapshot.into(),
        }
    }
}
