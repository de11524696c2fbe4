// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state of a bulb.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Represents the power state of a bulb.
///
/// On the wire the state is the lowercase string `"on"` or `"off"`.
///
/// # Examples
///
/// ```
/// use homesync_lib::types::PowerState;
///
/// assert_eq!("on".parse::<PowerState>().unwrap(), PowerState::On);
/// assert_eq!(PowerState::Off.as_str(), "off");
/// assert!("dim".parse::<PowerState>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Power is off.
    #[default]
    Off,
    /// Power is on.
    On,
}

impl PowerState {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }

    /// Returns `true` if the power is on.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            _ => Err(ValueError::InvalidPowerState(s.to_string())),
        }
    }
}

impl From<bool> for PowerState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("ON".parse::<PowerState>().unwrap(), PowerState::On);
        assert_eq!("Off".parse::<PowerState>().unwrap(), PowerState::Off);
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let err = "toggle".parse::<PowerState>().unwrap_err();
        assert_eq!(err, ValueError::InvalidPowerState("toggle".to_string()));
    }

    #[test]
    fn default_is_off() {
        assert_eq!(PowerState::default(), PowerState::Off);
        assert!(!PowerState::default().is_on());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PowerState::On).unwrap(), "\"on\"");
    }
}
