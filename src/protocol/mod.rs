// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker connectivity for devices.
//!
//! - [`Session`]: one logical connection with bounded connect, automatic
//!   reconnect and re-subscription
//! - [`Connector`] / [`Transport`] / [`EventStream`]: the seam between a
//!   session and a broker implementation
//! - [`MqttConnector`]: MQTT over `rumqttc` (feature `mqtt`)
//! - [`MemoryBroker`]: an in-process broker for tests and demos
//! - [`DeviceTopics`]: the `home/{category}/{id}/...` topic layout

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
mod session;
mod topics;
mod transport;

pub use memory::{DEFAULT_LOG_CAPACITY, MemoryBroker, MemoryConnector, PublishedMessage};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttConnector;
pub use session::{ConnectionState, Session, SessionHandler};
pub use topics::{DeviceTopics, ParsedTopic, Route, TOPIC_ROOT, topic_matches};
pub use transport::{Connection, Connector, EventFuture, EventStream, Transport, TransportEvent};
