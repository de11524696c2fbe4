// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed extraction of fields from JSON payload objects.
//!
//! Every helper treats an absent key and an explicit `null` the same way
//! (`Ok(None)`), and reports a wrong JSON type as a [`ValueError`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ValueError;
use crate::types::PowerState;

/// A JSON object payload.
pub type Payload = Map<String, Value>;

fn lookup<'a>(payload: &'a Payload, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
}

/// Reads the bulb power, accepting the legacy `state` key.
pub(crate) fn power(payload: &Payload) -> Result<Option<PowerState>, ValueError> {
    match lookup(payload, &["power", "state"]) {
        None => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(other) => Err(ValueError::InvalidPowerState(other.to_string())),
    }
}

/// Reads an integer field. Integers beyond `i64` saturate so that clamping
/// still applies.
pub(crate) fn integer(
    payload: &Payload,
    field: &'static str,
    aliases: &[&str],
) -> Result<Option<i64>, ValueError> {
    let mut keys = vec![field];
    keys.extend_from_slice(aliases);
    match lookup(payload, &keys) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .map(Some)
            .ok_or(ValueError::InvalidType {
                field,
                expected: "an integer",
            }),
        Some(_) => Err(ValueError::InvalidType {
            field,
            expected: "an integer",
        }),
    }
}

/// Reads a floating point field.
pub(crate) fn float(payload: &Payload, field: &'static str) -> Result<Option<f64>, ValueError> {
    match lookup(payload, &[field]) {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or(ValueError::InvalidType {
            field,
            expected: "a number",
        }),
    }
}

/// Reads a string field.
pub(crate) fn string(payload: &Payload, field: &'static str) -> Result<Option<String>, ValueError> {
    match lookup(payload, &[field]) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValueError::InvalidType {
            field,
            expected: "a string",
        }),
    }
}

/// Reads the lock flag. Only JSON booleans are accepted.
pub(crate) fn locked(payload: &Payload) -> Result<Option<bool>, ValueError> {
    match lookup(payload, &["locked"]) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ValueError::InvalidLockValue(other.to_string())),
    }
}

/// Reads the snapshot timestamp from `last_updated` or `timestamp`.
///
/// RFC 3339 strings and numeric epoch seconds are both accepted; anything
/// else is ignored and the caller stamps the current time.
pub(crate) fn timestamp(payload: &Payload) -> Option<DateTime<Utc>> {
    match lookup(payload, &["last_updated", "timestamp"])? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            // Safe: epoch seconds of realistic timestamps fit comfortably
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let (whole, nanos) = (secs.floor() as i64, (secs.fract() * 1e9) as u32);
            DateTime::from_timestamp(whole, nanos)
        }
        _ => None,
    }
}
