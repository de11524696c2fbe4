// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point-in-time copies of device state.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::types::DeviceKind;

use super::{BulbState, DeviceModel, LockState, SensorState};

/// An immutable copy of a device's state at one instant.
///
/// Serialized as a flat JSON object: `device_id`, the model's fields, then
/// `last_updated` as an RFC 3339 string. This is the exact payload published
/// on the device's state topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<M> {
    /// Identifier of the device.
    pub device_id: String,
    /// The state fields.
    #[serde(flatten)]
    pub state: M,
    /// When the state last changed.
    #[serde(serialize_with = "rfc3339")]
    pub last_updated: DateTime<Utc>,
}

fn rfc3339<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

impl<M: DeviceModel> Snapshot<M> {
    /// Kind of the device this snapshot belongs to.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        M::KIND
    }

    /// Renders the wire payload.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A snapshot of any device kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceSnapshot {
    /// Bulb snapshot.
    Light(Snapshot<BulbState>),
    /// Lock snapshot.
    Lock(Snapshot<LockState>),
    /// Sensor snapshot.
    Sensor(Snapshot<SensorState>),
}

impl DeviceSnapshot {
    /// Identifier of the device.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Light(s) => &s.device_id,
            Self::Lock(s) => &s.device_id,
            Self::Sensor(s) => &s.device_id,
        }
    }

    /// Kind of the device.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Light(_) => DeviceKind::Light,
            Self::Lock(_) => DeviceKind::Lock,
            Self::Sensor(_) => DeviceKind::Sensor,
        }
    }

    /// When the state last changed.
    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        match self {
            Self::Light(s) => s.last_updated,
            Self::Lock(s) => s.last_updated,
            Self::Sensor(s) => s.last_updated,
        }
    }

    /// Renders the wire payload.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<Snapshot<BulbState>> for DeviceSnapshot {
    fn from(s: Snapshot<BulbState>) -> Self {
        Self::Light(s)
    }
}

impl From<Snapshot<LockState>> for DeviceSnapshot {
    fn from(s: Snapshot<LockState>) -> Self {
        Self::Lock(s)
    }
}

impl From<Snapshot<SensorState>> for DeviceSnapshot {
    fn from(s: Snapshot<SensorState>) -> Self {
        Self::Sensor(s)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::types::{Brightness, PowerState};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn bulb_wire_format() {
        let snapshot = Snapshot {
            device_id: "light_1".to_string(),
            state: BulbState {
                power: PowerState::On,
                brightness: Brightness::clamped(75),
                color: "blue".to_string(),
            },
            last_updated: at(),
        };
        assert_eq!(
            snapshot.to_json(),
            json!({
                "device_id": "light_1",
                "power": "on",
                "brightness": 75,
                "color": "blue",
                "last_updated": "2024-05-01T10:00:00Z",
            })
        );
    }

    #[test]
    fn any_snapshot_is_untagged() {
        let snapshot: DeviceSnapshot = Snapshot {
            device_id: "door".to_string(),
            state: LockState { locked: false },
            last_updated: at(),
        }
        .into();
        assert_eq!(snapshot.kind(), DeviceKind::Lock);
        assert_eq!(snapshot.device_id(), "door");
        assert_eq!(snapshot.to_json()["locked"], json!(false));
        assert!(snapshot.to_json().get("Lock").is_none());
    }

    #[test]
    fn sensor_wire_format_uses_light_level() {
        let snapshot = Snapshot {
            device_id: "s".to_string(),
            state: SensorState::default(),
            last_updated: at(),
        };
        let value = snapshot.to_json();
        assert_eq!(value["light_level"], json!(500));
        assert_eq!(value["temperature"], json!(25.0));
    }
}
