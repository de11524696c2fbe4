// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device kinds and their topic categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// The closed set of device kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// A dimmable, colored bulb.
    Light,
    /// A door lock.
    Lock,
    /// A passive environment sensor.
    Sensor,
}

impl DeviceKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 3] = [Self::Light, Self::Lock, Self::Sensor];

    /// Returns the kind name used by the façade (`light`, `lock`, `sensor`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Lock => "lock",
            Self::Sensor => "sensor",
        }
    }

    /// Returns the topic category (`lights`, `locks`, `sensors`).
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Light => "lights",
            Self::Lock => "locks",
            Self::Sensor => "sensors",
        }
    }

    /// Returns the kind that owns a topic category.
    #[must_use]
    pub fn from_category(category: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.category() == category)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "lock" => Ok(Self::Lock),
            "sensor" => Ok(Self::Sensor),
            other => Err(DeviceError::UnknownKind(other.to_string())),
        }
    }
}
