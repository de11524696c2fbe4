// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound message handling.
//!
//! Nothing here returns an error: a malformed payload, an unknown command
//! or an invalid value is logged and the message is dropped, so a bad
//! message can never stop the session.

use serde_json::Value;

use super::handle::{Inner, next_stamp};
use crate::command::ControlCommand;
use crate::error::ParseError;
use crate::protocol::{Route, SessionHandler};
use crate::state::{DeviceModel, Payload, fields};

/// Decodes a message body. An empty body is an empty object.
pub(crate) fn decode_payload(bytes: &[u8]) -> Result<Payload, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::new());
    }
    match serde_json::from_slice(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::UnexpectedFormat(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// The correlation id carried by a payload, if any.
pub(crate) fn correlation_id(payload: &Payload) -> Option<&str> {
    payload
        .get(crate::command::CORRELATION_KEY)
        .and_then(Value::as_str)
}

impl<M: DeviceModel> Inner<M> {
    fn handle_control(&self, name: &str, payload: &Payload) {
        let command = match ControlCommand::decode(name, payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(device = %self.id, command = %name, error = %e, "Ignoring control message");
                return;
            }
        };

        match M::update_for(&command) {
            Ok(Some(update)) => {
                self.commit(&update, correlation_id(payload));
            }
            Ok(None) => {
                self.publish_latest(correlation_id(payload));
            }
            Err(e) => {
                tracing::warn!(device = %self.id, command = %name, error = %e, "Rejected control message");
            }
        }
    }

    /// Merges the fields present in a state message.
    ///
    /// A message stamped at or before the current snapshot is stale and is
    /// dropped: that covers the echo of every snapshot this device
    /// published and a retained predecessor replayed on subscribe. A newer
    /// message is merged, its timestamp adopted, and listeners notified.
    fn merge_state(&self, payload: &Payload) {
        let update = match M::parse_update(payload) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(device = %self.id, error = %e, "Ignoring state message");
                return;
            }
        };
        let stamp = fields::timestamp(payload);

        let merged = {
            let mut current = self.state.lock();
            if let Some(at) = stamp
                && at <= current.snapshot.last_updated
            {
                None
            } else {
                current.snapshot.state.apply(&update);
                current.snapshot.last_updated = match stamp {
                    Some(at) => at,
                    None => next_stamp(current.snapshot.last_updated),
                };
                current.revision += 1;
                self.state_tx.send_replace(current.snapshot.clone());
                Some((current.snapshot.clone(), current.revision))
            }
        };

        match merged {
            Some((snapshot, revision)) => {
                tracing::debug!(device = %self.id, revision, "State merged from message");
                self.notify(&snapshot, revision);
            }
            None => tracing::trace!(device = %self.id, "Ignoring stale state message"),
        }
    }
}

impl<M: DeviceModel> SessionHandler for Inner<M> {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        let Some(route) = self.topics.route(topic) else {
            tracing::trace!(device = %self.id, topic = %topic, "Ignoring foreign topic");
            return;
        };

        let payload = match decode_payload(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(device = %self.id, topic = %topic, error = %e, "Dropping malformed message");
                return;
            }
        };

        match route {
            Route::State => self.merge_state(&payload),
            Route::Control(name) => self.handle_control(name, &payload),
        }
    }

    fn on_connected(&self) {
        self.publish_latest(None);
    }
}
