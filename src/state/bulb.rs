// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bulb state: power, brightness and color.

use serde::Serialize;

use crate::command::ControlCommand;
use crate::error::{DeviceError, ValueError};
use crate::types::{Brightness, DeviceKind, PowerState};

use super::DeviceModel;
use super::fields::{self, Payload};

/// Color of a freshly created bulb.
pub const DEFAULT_COLOR: &str = "white";

/// Canonical state of a bulb.
///
/// Fields are independent: switching the power off leaves brightness and
/// color untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulbState {
    /// On/off.
    pub power: PowerState,
    /// Brightness, always within 0-100.
    pub brightness: Brightness,
    /// Free-form color name.
    pub color: String,
}

impl Default for BulbState {
    fn default() -> Self {
        Self {
            power: PowerState::Off,
            brightness: Brightness::MIN,
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

/// A partial bulb mutation. Only the fields that are `Some` are written.
///
/// # Examples
///
/// ```
/// use homesync_lib::state::BulbUpdate;
/// use homesync_lib::types::PowerState;
///
/// let update = BulbUpdate::new().power(PowerState::On).brightness(140);
/// assert_eq!(update.brightness, Some(140));
/// assert!(update.color.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulbUpdate {
    /// New power state.
    pub power: Option<PowerState>,
    /// New brightness, clamped to 0-100 when applied.
    pub brightness: Option<i64>,
    /// New color.
    pub color: Option<String>,
}

impl BulbUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the power field.
    #[must_use]
    pub fn power(mut self, power: PowerState) -> Self {
        self.power = Some(power);
        self
    }

    /// Sets the brightness field.
    #[must_use]
    pub fn brightness(mut self, brightness: i64) -> Self {
        self.brightness = Some(brightness);
        self
    }

    /// Sets the color field.
    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

impl DeviceModel for BulbState {
    type Update = BulbUpdate;

    const KIND: DeviceKind = DeviceKind::Light;

    fn parse_update(payload: &Payload) -> Result<Self::Update, ValueError> {
        Ok(BulbUpdate {
            power: fields::power(payload)?,
            brightness: fields::integer(payload, "brightness", &[])?,
            color: fields::string(payload, "color")?,
        })
    }

    fn update_for(command: &ControlCommand) -> Result<Option<Self::Update>, DeviceError> {
        match command {
            ControlCommand::SetPower(power) => Ok(Some(BulbUpdate::new().power(*power))),
            ControlCommand::SetBrightness(level) => Ok(Some(BulbUpdate::new().brightness(*level))),
            ControlCommand::SetColor(color) => Ok(Some(BulbUpdate::new().color(color.clone()))),
            ControlCommand::GetState => Ok(None),
            ControlCommand::SetLock(_) => Err(DeviceError::UnsupportedOperation {
                kind: Self::KIND,
                operation: command.name().to_string(),
            }),
        }
    }

    fn is_empty(update: &Self::Update) -> bool {
        update.power.is_none() && update.brightness.is_none() && update.color.is_none()
    }

    fn apply(&mut self, update: &Self::Update) {
        if let Some(power) = update.power {
            self.power = power;
        }
        if let Some(level) = update.brightness {
            self.brightness = Brightness::clamped(level);
        }
        if let Some(color) = &update.color {
            self.color.clone_from(color);
        }
    }
}
