// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for device state.
//!
//! - [`PowerState`] - on/off power of a bulb
//! - [`Brightness`] - bulb brightness, always within 0-100
//! - [`DeviceKind`] - light, lock or sensor

mod brightness;
mod kind;
mod power;

pub use brightness::Brightness;
pub use kind::DeviceKind;
pub use power::PowerState;
