// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment sensor readings.

use serde::Serialize;

use crate::command::ControlCommand;
use crate::error::{DeviceError, ValueError};
use crate::types::DeviceKind;

use super::DeviceModel;
use super::fields::{self, Payload};

/// Latest readings of an environment sensor.
///
/// Sensors are passive data sources. The only control they answer is
/// `get_state`; readings change through [`SensorUpdate`]s pushed by the
/// device itself or merged from state messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Ambient light in lux.
    pub light_level: i64,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            humidity: 50.0,
            light_level: 500,
        }
    }
}

/// A partial set of sensor readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorUpdate {
    /// New temperature.
    pub temperature: Option<f64>,
    /// New humidity.
    pub humidity: Option<f64>,
    /// New light level.
    pub light_level: Option<i64>,
}

impl SensorUpdate {
    /// A complete set of readings.
    #[must_use]
    pub fn readings(temperature: f64, humidity: f64, light_level: i64) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
            light_level: Some(light_level),
        }
    }
}

impl DeviceModel for SensorState {
    type Update = SensorUpdate;

    const KIND: DeviceKind = DeviceKind::Sensor;

    fn parse_update(payload: &Payload) -> Result<Self::Update, ValueError> {
        Ok(SensorUpdate {
            temperature: fields::float(payload, "temperature")?,
            humidity: fields::float(payload, "humidity")?,
            light_level: fields::integer(payload, "light_level", &["light"])?,
        })
    }

    fn update_for(command: &ControlCommand) -> Result<Option<Self::Update>, DeviceError> {
        match command {
            ControlCommand::GetState => Ok(None),
            ControlCommand::SetPower(_)
            | ControlCommand::SetBrightness(_)
            | ControlCommand::SetColor(_)
            | ControlCommand::SetLock(_) => Err(DeviceError::UnsupportedOperation {
                kind: Self::KIND,
                operation: command.name().to_string(),
            }),
        }
    }

    fn is_empty(update: &Self::Update) -> bool {
        update.temperature.is_none() && update.humidity.is_none() && update.light_level.is_none()
    }

    fn apply(&mut self, update: &Self::Update) {
        if let Some(t) = update.temperature {
            self.temperature = t;
        }
        if let Some(h) = update.humidity {
            self.humidity = h;
        }
        if let Some(l) = update.light_level {
            self.light_level = l;
        }
    }
}
