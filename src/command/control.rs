// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The control vocabulary shared by controllers and devices.

use serde_json::{Value, json};

use crate::error::{DeviceError, Error, ValueError};
use crate::state::Payload;
use crate::state::fields;
use crate::types::PowerState;

/// A control command addressed to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Switch a bulb on or off.
    SetPower(PowerState),
    /// Set bulb brightness. Out-of-range values are clamped by the device.
    SetBrightness(i64),
    /// Set bulb color.
    SetColor(String),
    /// Engage or release a lock.
    SetLock(bool),
    /// Ask the device to re-publish its state.
    GetState,
}

impl ControlCommand {
    /// Returns the command name, used as the control topic suffix.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetPower(_) => "set_state",
            Self::SetBrightness(_) => "set_brightness",
            Self::SetColor(_) => "set_color",
            Self::SetLock(_) => "set_lock",
            Self::GetState => "get_state",
        }
    }

    /// Returns the command fields as a JSON object, without correlation id.
    #[must_use]
    pub fn payload(&self) -> Payload {
        let value = match self {
            Self::SetPower(power) => json!({ "power": power }),
            Self::SetBrightness(level) => json!({ "brightness": level }),
            Self::SetColor(color) => json!({ "color": color }),
            Self::SetLock(locked) => json!({ "locked": locked }),
            Self::GetState => json!({}),
        };
        match value {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    /// Decodes an inbound control message.
    ///
    /// `set_state` reads `power`, falling back to the older `state` key, and
    /// `lock` is accepted as an alias of `set_lock`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnknownCommand`] for names outside the
    /// vocabulary, and a [`ValueError`] if a required field is missing or
    /// has an invalid value.
    pub fn decode(name: &str, payload: &Payload) -> Result<Self, Error> {
        let command = match name {
            "set_state" => Self::SetPower(
                fields::power(payload)?.ok_or(ValueError::MissingField("power"))?,
            ),
            "set_brightness" => Self::SetBrightness(
                fields::integer(payload, "brightness", &[])?
                    .ok_or(ValueError::MissingField("brightness"))?,
            ),
            "set_color" => Self::SetColor(
                fields::string(payload, "color")?.ok_or(ValueError::MissingField("color"))?,
            ),
            "set_lock" | "lock" => Self::SetLock(
                fields::locked(payload)?.ok_or(ValueError::MissingField("locked"))?,
            ),
            "get_state" => Self::GetState,
            other => return Err(DeviceError::UnknownCommand(other.to_string()).into()),
        };
        Ok(command)
    }
}
