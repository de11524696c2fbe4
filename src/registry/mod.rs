// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device registry for coordinating many devices.
//!
//! The [`DeviceRegistry`] is the entry point for a façade layer. It owns
//! every live [`Device`](crate::device::Device), enforces one instance per
//! identifier, routes control calls by kind, and republishes what happens
//! to its devices on an [`EventBus`](crate::event::EventBus).
//!
//! The registry is an ordinary value: construct one at the composition
//! root and hand clones to whatever needs it. Clones share the same table.
//!
//! # Examples
//!
//! ```
//! use homesync_lib::config::{ConnectionParams, RegistryConfig};
//! use homesync_lib::protocol::MemoryBroker;
//! use homesync_lib::registry::DeviceRegistry;
//! use homesync_lib::types::DeviceKind;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> homesync_lib::Result<()> {
//! let broker = MemoryBroker::new();
//! let registry = DeviceRegistry::new(broker.connector(), RegistryConfig::default());
//!
//! let params = ConnectionParams::new("localhost").with_port(1883);
//! registry.create_device(DeviceKind::Light, "bulb_1", params).await?;
//!
//! let devices = registry.list_devices(None).await;
//! assert_eq!(devices.len(), 1);
//! assert_eq!(devices[0].device_id, "bulb_1");
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod device_registry;

pub use device_registry::{DeviceInfo, DeviceRegistry};
