// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A device of any kind.

use std::sync::Arc;

use tokio::sync::watch;

use super::kinds::{Bulb, Lock, Sensor};
use crate::command::ControlCommand;
use crate::config::DeviceOptions;
use crate::error::Result;
use crate::protocol::{ConnectionState, Connector};
use crate::state::{DeviceSnapshot, Payload};
use crate::subscription::{Subscribable, SubscriptionId};
use crate::types::DeviceKind;

/// A device of any kind.
///
/// Every operation matches exhaustively on the kind, so adding a kind is a
/// compile-checked change.
#[derive(Debug, Clone)]
pub enum Device {
    /// A bulb.
    Light(Bulb),
    /// A lock.
    Lock(Lock),
    /// A sensor.
    Sensor(Sensor),
}

impl Device {
    /// Creates a disconnected device of `kind` in its default state.
    #[must_use]
    pub fn new(
        kind: DeviceKind,
        id: impl Into<String>,
        connector: Arc<dyn Connector>,
        options: DeviceOptions,
    ) -> Self {
        match kind {
            DeviceKind::Light => Self::Light(Bulb::new(id, connector, options)),
            DeviceKind::Lock => Self::Lock(Lock::new(id, connector, options)),
            DeviceKind::Sensor => Self::Sensor(Sensor::new(id, connector, options)),
        }
    }

    /// Device identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Light(d) => d.id(),
            Self::Lock(d) => d.id(),
            Self::Sensor(d) => d.id(),
        }
    }

    /// Device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Light(_) => DeviceKind::Light,
            Self::Lock(_) => DeviceKind::Lock,
            Self::Sensor(_) => DeviceKind::Sensor,
        }
    }

    /// Client id used by the session.
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Light(d) => d.client_id(),
            Self::Lock(d) => d.client_id(),
            Self::Sensor(d) => d.client_id(),
        }
    }

    /// Atomic snapshot of the state.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        match self {
            Self::Light(d) => d.current_state().into(),
            Self::Lock(d) => d.current_state().into(),
            Self::Sensor(d) => d.current_state().into(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        match self {
            Self::Light(d) => d.connection_state(),
            Self::Lock(d) => d.connection_state(),
            Self::Sensor(d) => d.connection_state(),
        }
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        match self {
            Self::Light(d) => d.watch_connection(),
            Self::Lock(d) => d.watch_connection(),
            Self::Sensor(d) => d.watch_connection(),
        }
    }

    /// Connects to the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be established.
    pub async fn connect(&self) -> Result<()> {
        match self {
            Self::Light(d) => d.connect().await,
            Self::Lock(d) => d.connect().await,
            Self::Sensor(d) => d.connect().await,
        }
    }

    /// Disconnects. Idempotent.
    pub async fn disconnect(&self) {
        match self {
            Self::Light(d) => d.disconnect().await,
            Self::Lock(d) => d.disconnect().await,
            Self::Sensor(d) => d.disconnect().await,
        }
    }

    /// Performs a control command locally.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error if the kind cannot perform
    /// the command.
    pub fn execute(&self, command: &ControlCommand) -> Result<DeviceSnapshot> {
        Ok(match self {
            Self::Light(d) => d.execute(command)?.into(),
            Self::Lock(d) => d.execute(command)?.into(),
            Self::Sensor(d) => d.execute(command)?.into(),
        })
    }

    /// Validates and applies a JSON patch.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any field is invalid.
    pub fn update_from_json(&self, payload: &Payload) -> Result<DeviceSnapshot> {
        Ok(match self {
            Self::Light(d) => d.update_from_json(payload)?.into(),
            Self::Lock(d) => d.update_from_json(payload)?.into(),
            Self::Sensor(d) => d.update_from_json(payload)?.into(),
        })
    }

    /// Feeds a raw message through the inbound path.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        match self {
            Self::Light(d) => d.handle_message(topic, payload),
            Self::Lock(d) => d.handle_message(topic, payload),
            Self::Sensor(d) => d.handle_message(topic, payload),
        }
    }

    /// Registers a listener receiving every new snapshot.
    pub fn on_snapshot<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&DeviceSnapshot) + Send + Sync + 'static,
    {
        match self {
            Self::Light(d) => d.on_state_changed(move |s| listener(&DeviceSnapshot::from(s.clone()))),
            Self::Lock(d) => d.on_state_changed(move |s| listener(&DeviceSnapshot::from(s.clone()))),
            Self::Sensor(d) => d.on_state_changed(move |s| listener(&DeviceSnapshot::from(s.clone()))),
        }
    }

    /// Unregisters a listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self {
            Self::Light(d) => d.unsubscribe(id),
            Self::Lock(d) => d.unsubscribe(id),
            Self::Sensor(d) => d.unsubscribe(id),
        }
    }

    /// Returns the bulb, if this is one.
    #[must_use]
    pub fn as_bulb(&self) -> Option<&Bulb> {
        match self {
            Self::Light(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the lock, if this is one.
    #[must_use]
    pub fn as_lock(&self) -> Option<&Lock> {
        match self {
            Self::Lock(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the sensor, if this is one.
    #[must_use]
    pub fn as_sensor(&self) -> Option<&Sensor> {
        match self {
            Self::Sensor(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Bulb> for Device {
    fn from(d: Bulb) -> Self {
        Self::Light(d)
    }
}

impl From<Lock> for Device {
    fn from(d: Lock) -> Self {
        Self::Lock(d)
    }
}

impl From<Sensor> for Device {
    fn from(d: Sensor) -> Self {
        Self::Sensor(d)
    }
}
