// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection parameters and timing policies.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use homesync_lib::config::{AckMode, CommandPolicy, ConnectionParams, DeviceOptions};
//!
//! let options = DeviceOptions::new(
//!     ConnectionParams::new("mqtt://192.168.1.50")
//!         .with_port(1883)
//!         .with_credentials("user", "secret"),
//! )
//! .with_command_policy(
//!     CommandPolicy::default()
//!         .with_ack(AckMode::AwaitAck)
//!         .with_timeout(Duration::from_secs(2)),
//! );
//! assert_eq!(options.params.port, Some(1883));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, ProtocolError};
use crate::types::DeviceKind;

/// Port used when neither the broker URL nor `port` names one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Broker connection parameters supplied when a device is created.
///
/// Deserializes from the façade's JSON body, e.g.
/// `{"broker": "localhost", "port": 1883}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Broker host or URL (`mqtt://host:port`, `tcp://host`, `host`).
    pub broker: Option<String>,
    /// Broker port. Overrides a port embedded in `broker`.
    pub port: Option<u16>,
    /// Broker username.
    pub username: Option<String>,
    /// Broker password.
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(rename = "keep_alive")]
    pub keep_alive_secs: Option<u64>,
}

impl ConnectionParams {
    /// Creates parameters pointing at `broker`.
    #[must_use]
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: Some(broker.into()),
            ..Self::default()
        }
    }

    /// Sets the broker port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_secs = Some(keep_alive.as_secs());
        self
    }

    /// Returns the keep-alive interval, 60 seconds unless configured.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.unwrap_or(60))
    }

    /// Returns the credentials if both parts are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username.as_deref().zip(self.password.as_deref())
    }

    /// Lists the parameters `kind` requires that are absent.
    ///
    /// Lights need `broker` and `port`; locks and sensors need `broker`.
    #[must_use]
    pub fn missing_for(&self, kind: DeviceKind) -> Vec<String> {
        let mut missing = Vec::new();
        if self.broker.as_deref().is_none_or(str::is_empty) {
            missing.push("broker".to_string());
        }
        if kind == DeviceKind::Light && self.port.is_none() {
            missing.push("port".to_string());
        }
        missing
    }

    /// Checks that every parameter `kind` requires is present.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::MissingParameters`] naming the absent ones.
    pub fn validate_for(&self, kind: DeviceKind) -> Result<(), DeviceError> {
        let missing = self.missing_for(kind);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DeviceError::MissingParameters(missing))
        }
    }

    /// Resolves the broker host and port.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] if no broker is set or the
    /// embedded port is not a number.
    pub fn endpoint(&self) -> Result<(String, u16), ProtocolError> {
        let broker = self
            .broker
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ProtocolError::InvalidAddress("broker is required".to_string()))?;

        let url = broker
            .strip_prefix("mqtt://")
            .or_else(|| broker.strip_prefix("tcp://"))
            .unwrap_or(broker);

        let (host, embedded) = match url.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse()
                    .map_err(|_| ProtocolError::InvalidAddress(format!("Invalid port: {p}")))?;
                (h.to_string(), Some(port))
            }
            None => (url.to_string(), None),
        };

        Ok((host, self.port.or(embedded).unwrap_or(DEFAULT_MQTT_PORT)))
    }
}

/// Configuration for automatic reconnection after an unexpected loss.
///
/// Attempts are spaced by a fixed `backoff`. The default makes 3 attempts
/// 2 seconds apart.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use homesync_lib::config::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::new()
///     .with_max_attempts(5)
///     .with_backoff(Duration::from_millis(500));
/// assert!(policy.should_retry(4));
/// assert!(!policy.should_retry(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay before each attempt.
    pub backoff: Duration,
}

impl ReconnectionPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before each attempt.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns true if attempt number `attempt` (zero-based) may run.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && attempt < self.max_attempts
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Timing of the transport session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPolicy {
    /// How many times `connect()` checks for an established session.
    pub connect_attempts: u32,
    /// Spacing between connect checks.
    pub connect_interval: Duration,
    /// What to do after an unexpected disconnect.
    pub reconnect: ReconnectionPolicy,
}

impl SessionPolicy {
    /// Sets the number of connect checks.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    /// Sets the spacing between connect checks.
    #[must_use]
    pub fn with_connect_interval(mut self, interval: Duration) -> Self {
        self.connect_interval = interval;
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectionPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Upper bound on the time `connect()` blocks.
    #[must_use]
    pub fn connect_budget(&self) -> Duration {
        self.connect_interval * self.connect_attempts
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_interval: Duration::from_millis(500),
            reconnect: ReconnectionPolicy::default(),
        }
    }
}

/// How `send_command` completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Return as soon as the command is handed to the transport.
    #[default]
    FireAndForget,
    /// Wait for the device to echo the correlation id, up to the timeout.
    AwaitAck,
}

/// Timing of the command/ack channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    /// Completion mode of `send_command`.
    pub ack: AckMode,
    /// Acknowledgement timeout, also the pending-entry lifetime.
    pub timeout: Duration,
    /// Bound on `request_state`.
    pub state_query_timeout: Duration,
}

impl CommandPolicy {
    /// Sets the completion mode.
    #[must_use]
    pub fn with_ack(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    /// Sets the acknowledgement timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the state query bound.
    #[must_use]
    pub fn with_state_query_timeout(mut self, timeout: Duration) -> Self {
        self.state_query_timeout = timeout;
        self
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            ack: AckMode::FireAndForget,
            timeout: Duration::from_secs(5),
            state_query_timeout: Duration::from_secs(1),
        }
    }
}

/// Everything needed to build one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceOptions {
    /// Broker connection parameters.
    pub params: ConnectionParams,
    /// Session timing.
    pub session: SessionPolicy,
    /// Command timing.
    pub command: CommandPolicy,
}

impl DeviceOptions {
    /// Creates options with default policies.
    #[must_use]
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Sets the session policy.
    #[must_use]
    pub fn with_session_policy(mut self, session: SessionPolicy) -> Self {
        self.session = session;
        self
    }

    /// Sets the command policy.
    #[must_use]
    pub fn with_command_policy(mut self, command: CommandPolicy) -> Self {
        self.command = command;
        self
    }
}

/// Configuration of a [`DeviceRegistry`](crate::registry::DeviceRegistry).
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Session policy given to every created device.
    pub session: SessionPolicy,
    /// Command policy given to every created device.
    pub command: CommandPolicy,
    /// Capacity of the event bus.
    pub event_capacity: usize,
}

impl RegistryConfig {
    /// Sets the session policy.
    #[must_use]
    pub fn with_session_policy(mut self, session: SessionPolicy) -> Self {
        self.session = session;
        self
    }

    /// Sets the command policy.
    #[must_use]
    pub fn with_command_policy(mut self, command: CommandPolicy) -> Self {
        self.command = command;
        self
    }

    /// Sets the event bus capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Device options for a device created with `params`.
    #[must_use]
    pub fn device_options(&self, params: ConnectionParams) -> DeviceOptions {
        DeviceOptions {
            params,
            session: self.session.clone(),
            command: self.command.clone(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session: SessionPolicy::default(),
            command: CommandPolicy::default(),
            event_capacity: 256,
        }
    }
}
