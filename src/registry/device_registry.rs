// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device registry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

use crate::command::ControlCommand;
use crate::config::{ConnectionParams, RegistryConfig};
use crate::device::Device;
use crate::error::{DeviceError, Error, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::protocol::{ConnectionState, Connector};
use crate::response::Reply;
use crate::state::{DeviceSnapshot, Payload};
use crate::subscription::SubscriptionId;
use crate::types::DeviceKind;

/// One row of [`DeviceRegistry::list_devices`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Device identifier.
    pub device_id: String,
    /// Device kind.
    pub kind: DeviceKind,
    /// Atomic snapshot of the device's state.
    pub state: DeviceSnapshot,
}

/// A registered device and the wiring that forwards its events.
struct Entry {
    device: Device,
    listener: SubscriptionId,
    watcher: JoinHandle<()>,
}

impl Entry {
    async fn teardown(self) {
        self.watcher.abort();
        self.device.unsubscribe(self.listener);
        self.device.disconnect().await;
    }
}

/// Registry of live devices keyed by identifier.
///
/// The table sits behind one lock. Reads ([`list_devices`](Self::list_devices),
/// [`get_device`](Self::get_device)) share it; create and delete take it
/// exclusively, and never hold it across a connect or disconnect.
///
/// # Events
///
/// [`subscribe`](Self::subscribe) returns a receiver for:
///
/// - `DeviceAdded` / `DeviceRemoved` on create and delete
/// - `StateChanged` for every state change of every device
/// - `ConnectionChanged` when a device's session drops, recovers, or gives up
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, Entry>>>,
    connector: Arc<dyn Connector>,
    config: RegistryConfig,
    event_bus: EventBus,
}

impl DeviceRegistry {
    /// Creates an empty registry whose devices connect through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: RegistryConfig) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            connector,
            event_bus: EventBus::with_capacity(config.event_capacity),
            config,
        }
    }

    /// Creates an empty registry whose devices connect to real MQTT brokers.
    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn mqtt(config: RegistryConfig) -> Self {
        Self::new(crate::protocol::MqttConnector::shared(), config)
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Subscribes to events for all registered devices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_bus.subscribe()
    }

    /// Returns the number of active event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.event_bus.subscriber_count()
    }

    // =========================================================================
    // Device Management
    // =========================================================================

    /// Creates, connects and registers a device.
    ///
    /// The device is registered only once its session is connected. If the
    /// identifier is taken, nothing is created.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::MissingParameters`] listing every required parameter
    ///   `kind` needs and `params` lacks
    /// - [`DeviceError::AlreadyExists`] if `device_id` is registered
    /// - [`ProtocolError::ConnectionFailed`](crate::error::ProtocolError::ConnectionFailed)
    ///   if the session could not be established
    pub async fn create_device(
        &self,
        kind: DeviceKind,
        device_id: impl Into<String>,
        params: ConnectionParams,
    ) -> Result<Device> {
        let device_id = device_id.into();
        params.validate_for(kind).inspect_err(|e| {
            tracing::warn!(device = %device_id, %kind, error = %e, "Rejected device creation");
        })?;

        if self.devices.read().await.contains_key(&device_id) {
            return Err(DeviceError::AlreadyExists(device_id).into());
        }

        let device = Device::new(
            kind,
            device_id.clone(),
            Arc::clone(&self.connector),
            self.config.device_options(params),
        );
        if let Err(e) = device.connect().await {
            tracing::warn!(device = %device_id, %kind, error = %e, "Device did not connect, not registered");
            return Err(e);
        }

        let mut devices = self.devices.write().await;
        if devices.contains_key(&device_id) {
            drop(devices);
            device.disconnect().await;
            return Err(DeviceError::AlreadyExists(device_id).into());
        }

        let bus = self.event_bus.clone();
        let listener = device.on_snapshot(move |snapshot| {
            bus.publish(DeviceEvent::state_changed(snapshot.clone()));
        });
        let watcher = self.spawn_connection_watch(&device);
        devices.insert(
            device_id.clone(),
            Entry {
                device: device.clone(),
                listener,
                watcher,
            },
        );
        drop(devices);

        tracing::info!(device = %device_id, %kind, "Device registered");
        self.event_bus
            .publish(DeviceEvent::device_added(device_id, kind));
        Ok(device)
    }

    /// Disconnects and removes a device.
    ///
    /// Returns `false` if `device_id` was not registered.
    pub async fn delete_device(&self, device_id: &str) -> bool {
        let Some(entry) = self.devices.write().await.remove(device_id) else {
            tracing::debug!(device = %device_id, "Delete of unknown device");
            return false;
        };

        entry.teardown().await;
        tracing::info!(device = %device_id, "Device removed");
        self.event_bus.publish(DeviceEvent::device_removed(device_id));
        true
    }

    /// Looks up a device.
    pub async fn get_device(&self, device_id: &str) -> Option<Device> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|entry| entry.device.clone())
    }

    /// Lists registered devices, optionally only those of one kind.
    ///
    /// The order is unspecified.
    pub async fn list_devices(&self, kind: Option<DeviceKind>) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .await
            .values()
            .filter(|entry| kind.is_none_or(|k| entry.device.kind() == k))
            .map(|entry| DeviceInfo {
                device_id: entry.device.id().to_string(),
                kind: entry.device.kind(),
                state: entry.device.snapshot(),
            })
            .collect()
    }

    /// Returns the number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns `true` if no device is registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Disconnects and removes every device.
    pub async fn shutdown(&self) {
        let entries: Vec<_> = self.devices.write().await.drain().collect();
        let count = entries.len();
        for (device_id, entry) in entries {
            entry.teardown().await;
            self.event_bus.publish(DeviceEvent::device_removed(device_id));
        }
        tracing::info!(count, "Registry shut down");
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Performs a control command on a device and returns its new state.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] for an unknown identifier
    /// - [`DeviceError::UnsupportedOperation`] if the device's kind cannot
    ///   perform the command; its state is left unchanged
    pub async fn control(&self, device_id: &str, command: &ControlCommand) -> Result<DeviceSnapshot> {
        let device = self
            .get_device(device_id)
            .await
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;
        device.execute(command)
    }

    /// Decodes a named control request and performs it.
    ///
    /// This is the façade entry point: the command name and JSON body come
    /// straight from the request, and every outcome is a [`Reply`].
    pub async fn dispatch(&self, device_id: &str, command: &str, payload: &Payload) -> Reply {
        let result = match ControlCommand::decode(command, payload) {
            Ok(command) => self.control(device_id, &command).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!(device = %device_id, command = %command, error = %e, "Control request failed");
        }
        Reply::from_result(&result, format!("{command} applied"))
    }

    /// The one-time state push answering a client's "subscribe" request.
    ///
    /// Returns `{"device_id": ..., "state": {...}}`, or `None` for an unknown
    /// device.
    pub async fn push_state(&self, device_id: &str) -> Option<Value> {
        let device = self.get_device(device_id).await?;
        Some(json!({
            "device_id": device_id,
            "state": device.snapshot().to_json(),
        }))
    }

    /// Forwards connection transitions of `device` onto the event bus.
    fn spawn_connection_watch(&self, device: &Device) -> JoinHandle<()> {
        let mut rx = device.watch_connection();
        let bus = self.event_bus.clone();
        let device_id = device.id().to_string();

        tokio::spawn(async move {
            let mut connected = rx.borrow_and_update().is_connected();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                match state {
                    ConnectionState::Connected if !connected => {
                        connected = true;
                        bus.publish(DeviceEvent::connected(&device_id));
                    }
                    ConnectionState::Failed(reason) => {
                        connected = false;
                        bus.publish(DeviceEvent::disconnected_with_error(&device_id, reason));
                    }
                    ConnectionState::Reconnecting { .. } | ConnectionState::Disconnected
                        if connected =>
                    {
                        connected = false;
                        bus.publish(DeviceEvent::disconnected(&device_id));
                    }
                    _ => {}
                }
            }
            tracing::debug!(device = %device_id, "Connection watch stopped");
        })
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("config", &self.config)
            .field("subscribers", &self.event_bus.subscriber_count())
            .finish_non_exhaustive()
    }
}
