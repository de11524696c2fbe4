// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kind-specific operations.

use serde_json::Value;

use super::handle::DeviceHandle;
use crate::error::{Result, ValueError};
use crate::state::{BulbState, BulbUpdate, LockState, LockUpdate, SensorState, SensorUpdate, Snapshot};
use crate::types::PowerState;

/// A smart bulb.
pub type Bulb = DeviceHandle<BulbState>;

/// A door lock.
pub type Lock = DeviceHandle<LockState>;

/// An environment sensor.
pub type Sensor = DeviceHandle<SensorState>;

impl DeviceHandle<BulbState> {
    /// Switches the bulb on or off. Brightness and color are kept.
    pub fn set_power(&self, power: PowerState) -> Snapshot<BulbState> {
        self.update_state(&BulbUpdate::new().power(power))
    }

    /// Sets the brightness, clamped to 0-100.
    pub fn set_brightness(&self, brightness: i64) -> Snapshot<BulbState> {
        self.update_state(&BulbUpdate::new().brightness(brightness))
    }

    /// Sets the color.
    pub fn set_color(&self, color: impl Into<String>) -> Snapshot<BulbState> {
        self.update_state(&BulbUpdate::new().color(color))
    }
}

impl DeviceHandle<LockState> {
    /// Engages or releases the bolt.
    pub fn set_lock(&self, locked: bool) -> Snapshot<LockState> {
        self.update_state(&LockUpdate {
            locked: Some(locked),
        })
    }

    /// Engages or releases the bolt from an untyped value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidLockValue`] for anything but a JSON
    /// boolean; the state is left unchanged.
    pub fn set_lock_value(&self, value: &Value) -> Result<Snapshot<LockState>> {
        match value {
            Value::Bool(locked) => Ok(self.set_lock(*locked)),
            other => {
                tracing::warn!(device = %self.id(), value = %other, "Rejected lock value");
                Err(ValueError::InvalidLockValue(other.to_string()).into())
            }
        }
    }
}

impl DeviceHandle<SensorState> {
    /// Overwrites all three readings at once.
    pub fn update_readings(
        &self,
        temperature: f64,
        humidity: f64,
        light_level: i64,
    ) -> Snapshot<SensorState> {
        self.update_state(&SensorUpdate::readings(temperature, humidity, light_level))
    }
}
