// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kind-specific controller operations.

use super::handle::Controller;
use crate::command::ControlCommand;
use crate::error::Result;
use crate::state::{BulbState, DeviceModel, LockState, SensorState, Snapshot};
use crate::types::{Brightness, PowerState};

/// Controls a remote bulb.
pub type BulbController = Controller<BulbState>;

/// Controls a remote lock.
pub type LockController = Controller<LockState>;

/// Reads a remote sensor.
pub type SensorController = Controller<SensorState>;

impl<M: DeviceModel> Controller<M> {
    /// Asks the device for its state; see [`request_state`](Self::request_state).
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or if no answer arrives in time.
    pub async fn get_state(&self) -> Result<Snapshot<M>> {
        self.request_state().await
    }
}

impl Controller<BulbState> {
    /// Switches the bulb on.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Controller::send_command).
    pub async fn turn_on(&self) -> Result<String> {
        self.send_command(&ControlCommand::SetPower(PowerState::On)).await
    }

    /// Switches the bulb off.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Controller::send_command).
    pub async fn turn_off(&self) -> Result<String> {
        self.send_command(&ControlCommand::SetPower(PowerState::Off)).await
    }

    /// Sets the brightness.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::OutOfRange`](crate::error::ValueError::OutOfRange)
    /// without sending anything if `level` is outside 0-100.
    pub async fn set_brightness(&self, level: i64) -> Result<String> {
        let level = Brightness::new(level).inspect_err(|e| {
            tracing::warn!(device = %self.id(), error = %e, "Rejected brightness");
        })?;
        self.send_command(&ControlCommand::SetBrightness(i64::from(level.value())))
            .await
    }

    /// Sets the color.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Controller::send_command).
    pub async fn set_color(&self, color: impl Into<String>) -> Result<String> {
        self.send_command(&ControlCommand::SetColor(color.into())).await
    }
}

impl Controller<LockState> {
    /// Engages the bolt.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Controller::send_command).
    pub async fn lock(&self) -> Result<String> {
        self.send_command(&ControlCommand::SetLock(true)).await
    }

    /// Releases the bolt.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Controller::send_command).
    pub async fn unlock(&self) -> Result<String> {
        self.send_command(&ControlCommand::SetLock(false)).await
    }
}
