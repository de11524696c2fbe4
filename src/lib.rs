// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `homesync` Lib - simulate and control smart-home devices over MQTT.
//!
//! Each device (a bulb, a lock, or an environmental sensor) keeps its
//! authoritative state behind a lock, publishes it as a retained snapshot
//! on `home/{category}/{device_id}/state`, and takes commands on
//! `home/{category}/{device_id}/control/{command}`. Commands carry a
//! correlation id which the device echoes back with its next snapshot.
//!
//! # Supported Features
//!
//! - **Device state machines**: validated, atomic state for bulbs, locks and sensors
//! - **Command/ack channel**: controllers sending commands with correlation ids, pending-command tracking, optional acknowledgement wait
//! - **Sessions**: bounded connect retries, automatic reconnection with resubscription
//! - **Registry**: one live instance per device id, control routing by kind, event bus
//!
//! # Quick Start
//!
//! ## A single device
//!
//! ```no_run
//! use homesync_lib::config::{ConnectionParams, DeviceOptions};
//! use homesync_lib::device::Bulb;
//! use homesync_lib::protocol::MqttConnector;
//! use homesync_lib::subscription::Subscribable;
//! use homesync_lib::types::PowerState;
//!
//! #[tokio::main]
//! async fn main() -> homesync_lib::Result<()> {
//!     let params = ConnectionParams::new("mqtt://192.168.1.50").with_port(1883);
//!     let bulb = Bulb::new("living_room", MqttConnector::shared(), DeviceOptions::new(params));
//!
//!     bulb.on_state_changed(|snapshot| {
//!         println!("{} is now {:?}", snapshot.device_id, snapshot.state);
//!     });
//!
//!     bulb.connect().await?;
//!     bulb.set_power(PowerState::On);
//!     bulb.set_brightness(75);
//!     bulb.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## A registry
//!
//! ```no_run
//! use homesync_lib::DeviceRegistry;
//! use homesync_lib::command::ControlCommand;
//! use homesync_lib::config::{ConnectionParams, RegistryConfig};
//! use homesync_lib::types::DeviceKind;
//!
//! #[tokio::main]
//! async fn main() -> homesync_lib::Result<()> {
//!     let registry = DeviceRegistry::mqtt(RegistryConfig::default());
//!
//!     let mut events = registry.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {event:?}");
//!         }
//!     });
//!
//!     let params = ConnectionParams::new("localhost");
//!     registry.create_device(DeviceKind::Lock, "front_door", params).await?;
//!     registry.control("front_door", &ControlCommand::SetLock(false)).await?;
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Testing without a broker
//!
//! [`protocol::MemoryBroker`] is an in-process broker with retained messages
//! and wildcard subscriptions. Pass its [`connector`](protocol::MemoryBroker::connector)
//! wherever a connector is expected.

pub mod command;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod response;
pub mod state;
pub mod subscription;
pub mod types;

pub use command::ControlCommand;
pub use config::{ConnectionParams, DeviceOptions, RegistryConfig};
pub use controller::{BulbController, Controller, LockController, SensorController};
pub use device::{Bulb, Device, DeviceHandle, Lock, Sensor};
pub use error::{DeviceError, Error, ParseError, ProtocolError, Result, ValueError};
pub use event::{DeviceEvent, EventBus};
#[cfg(feature = "mqtt")]
pub use protocol::MqttConnector;
pub use protocol::{ConnectionState, MemoryBroker};
pub use registry::{DeviceInfo, DeviceRegistry};
pub use response::Reply;
pub use state::{DeviceSnapshot, Snapshot};
pub use subscription::{Subscribable, SubscriptionId};
pub use types::{Brightness, DeviceKind, PowerState};
