// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `homesync` library.
//!
//! The hierarchy mirrors the failure classes of the device protocol:
//! value validation, transport communication, payload parsing, and
//! device/registry operations.

use thiserror::Error;

use crate::types::DeviceKind;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A control payload carried an invalid value.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The transport failed, was lost, or timed out.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The device rejected the operation.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// No device is registered under this identifier.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device session is not connected.
    #[error("device is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` for failures caused by bad input rather than by the
    /// transport or the registry.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Value(_) | Self::Parse(_))
    }

    /// Returns `true` if this is a command acknowledgement or connect timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Protocol(ProtocolError::Timeout(_)))
    }
}

/// Errors related to value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
        /// The actual value that was provided.
        actual: i64,
    },

    /// An unrecognized power state string was provided.
    #[error("invalid power state: {0}")]
    InvalidPowerState(String),

    /// A lock value that is neither `true` nor `false`.
    #[error("invalid lock value: {0}")]
    InvalidLockValue(String),

    /// A required field is absent from the payload.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong JSON type.
    #[error("field {field} must be {expected}")]
    InvalidType {
        /// The offending field.
        field: &'static str,
        /// Human readable description of the expected type.
        expected: &'static str,
    },
}

/// Errors related to broker communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The MQTT client rejected a request.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The session could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An established session dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A bounded wait expired.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to decoding message payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not the expected shape.
    #[error("unexpected payload format: {0}")]
    UnexpectedFormat(String),
}

/// Errors related to device and registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device kind has no such capability.
    #[error("{kind} does not support {operation}")]
    UnsupportedOperation {
        /// Kind of the addressed device.
        kind: DeviceKind,
        /// The rejected operation.
        operation: String,
    },

    /// The command name is not part of the control vocabulary.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The device type name is not one of `light`, `lock`, `sensor`.
    #[error("unknown device type: {0}")]
    UnknownKind(String),

    /// Required connection parameters were not supplied.
    #[error("missing parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    /// A device with this identifier is already registered.
    #[error("device already exists: {0}")]
    AlreadyExists(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            min: 0,
            max: 100,
            actual: 150,
        };
        assert_eq!(err.to_string(), "value 150 is out of range [0, 100]");
    }

    #[test]
    fn error_from_value_error() {
        let err: Error = ValueError::InvalidLockValue("\"yes\"".to_string()).into();
        assert!(err.is_validation());
        assert!(matches!(err, Error::Value(ValueError::InvalidLockValue(_))));
    }

    #[test]
    fn missing_parameters_display() {
        let err = DeviceError::MissingParameters(vec!["broker".into(), "port".into()]);
        assert_eq!(err.to_string(), "missing parameters: broker, port");
    }

    #[test]
    fn unsupported_operation_display() {
        let err = DeviceError::UnsupportedOperation {
            kind: DeviceKind::Sensor,
            operation: "set_brightness".to_string(),
        };
        assert_eq!(err.to_string(), "sensor does not support set_brightness");
    }

    #[test]
    fn timeout_is_distinct_from_validation() {
        let err: Error = ProtocolError::Timeout(5000).into();
        assert!(err.is_timeout());
        assert!(!err.is_validation());
    }
}
