// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry-wide device events.
//!
//! Per-device listeners (see [`Subscribable`](crate::subscription::Subscribable))
//! are synchronous and typed. The [`EventBus`] is the asynchronous,
//! registry-wide counterpart: the registry forwards every state change and
//! connection change of every device onto one broadcast channel, which is
//! what a push layer such as a WebSocket server subscribes to.
//!
//! # Examples
//!
//! ```
//! use homesync_lib::event::{DeviceEvent, EventBus};
//! use homesync_lib::types::DeviceKind;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(DeviceEvent::device_added("sensor_1", DeviceKind::Sensor));
//! assert!(rx.try_recv().unwrap().is_lifecycle());
//! ```

mod device_event;
mod event_bus;

pub use device_event::DeviceEvent;
pub use event_bus::EventBus;
