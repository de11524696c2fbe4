// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The remote side of the command/ack channel.

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};

use crate::command::{CORRELATION_KEY, ControlCommand, PendingCommands, next_correlation_id};
use crate::config::{AckMode, CommandPolicy, DeviceOptions};
use crate::device::{client_id, correlation_id, decode_payload};
use crate::error::{ParseError, ProtocolError, Result};
use crate::protocol::{ConnectionState, Connector, DeviceTopics, Route, Session, SessionHandler};
use crate::state::{DeviceModel, Payload, Snapshot, fields};
use crate::subscription::{ListenerRegistry, Subscribable, SubscriptionId};
use crate::types::DeviceKind;

/// Drives one remote device of kind `M` over the broker.
///
/// A controller subscribes to the device's state topic only. It never
/// publishes state: it sends control messages and tracks the snapshots the
/// device answers with. The retained snapshot delivered on subscribe primes
/// [`current_state`](Self::current_state).
pub struct Controller<M: DeviceModel> {
    inner: Arc<Inner<M>>,
}

struct Inner<M: DeviceModel> {
    id: String,
    topics: DeviceTopics,
    latest: Mutex<Option<Snapshot<M>>>,
    state_tx: watch::Sender<Option<Snapshot<M>>>,
    listeners: ListenerRegistry<Snapshot<M>>,
    pending: PendingCommands,
    session: Session,
    policy: CommandPolicy,
}

impl<M: DeviceModel> Clone for Controller<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<M: DeviceModel> Controller<M> {
    /// Creates a disconnected controller for the device `id`.
    #[must_use]
    pub fn new(id: impl Into<String>, connector: Arc<dyn Connector>, options: DeviceOptions) -> Self {
        let id = id.into();
        let topics = DeviceTopics::new(M::KIND, &id);
        let (state_tx, _) = watch::channel(None);
        let session = Session::new(
            client_id(),
            connector,
            options.params,
            options.session,
            vec![topics.state()],
        );

        Self {
            inner: Arc::new(Inner {
                id,
                topics,
                latest: Mutex::new(None),
                state_tx,
                listeners: ListenerRegistry::new(),
                pending: PendingCommands::new(options.command.timeout),
                session,
                policy: options.command,
            }),
        }
    }

    /// Identifier of the controlled device.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Kind of the controlled device.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        M::KIND
    }

    /// Topics of the controlled device.
    #[must_use]
    pub fn topics(&self) -> &DeviceTopics {
        &self.inner.topics
    }

    /// Client id used by the session.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.inner.session.client_id()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.session.state()
    }

    /// Returns true if the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    /// Connects and subscribes to the device's state topic.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConnectionFailed`] if the session could not
    /// be established within the connect budget.
    pub async fn connect(&self) -> Result<()> {
        let weak: Weak<Inner<M>> = Arc::downgrade(&self.inner);
        let handler: Weak<dyn SessionHandler> = weak;
        self.inner.session.connect(handler).await
    }

    /// Disconnects. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.session.disconnect().await;
    }

    /// The last snapshot received from the device, if any.
    #[must_use]
    pub fn current_state(&self) -> Option<Snapshot<M>> {
        self.inner.latest.lock().clone()
    }

    /// Watches the last known snapshot. Receivers are woken by every state
    /// message that is not older than the one held.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Snapshot<M>>> {
        self.inner.state_tx.subscribe()
    }

    /// Registers a listener called with every new snapshot from the device.
    pub fn subscribe_state<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Snapshot<M>) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    /// Publishes a control command and returns its correlation id.
    ///
    /// With [`AckMode::FireAndForget`] this returns once the command is
    /// queued. With [`AckMode::AwaitAck`] it waits for a state message
    /// echoing the correlation id.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::UnsupportedOperation`](crate::error::DeviceError::UnsupportedOperation)
    ///   before anything is sent, if the device kind cannot perform the command
    /// - [`Error::NotConnected`](crate::error::Error::NotConnected) without a live session
    /// - [`ProtocolError::Timeout`] if the acknowledgement does not arrive in
    ///   time; the pending entry is removed
    pub async fn send_command(&self, command: &ControlCommand) -> Result<String> {
        M::update_for(command)?;

        let wait = self.inner.policy.ack == AckMode::AwaitAck;
        let (correlation_id, ack) = self.publish_command(command, wait)?;

        if let Some(ack) = ack {
            let timeout = self.inner.policy.timeout;
            if !matches!(tokio::time::timeout(timeout, ack).await, Ok(Ok(()))) {
                self.inner.pending.remove(&correlation_id);
                tracing::warn!(
                    device = %self.inner.id,
                    correlation_id = %correlation_id,
                    "Command was not acknowledged"
                );
                return Err(ProtocolError::Timeout(millis(timeout)).into());
            }
            tracing::debug!(device = %self.inner.id, correlation_id = %correlation_id, "Command acknowledged");
        }

        Ok(correlation_id)
    }

    /// Asks the device for its state and waits for the answer, up to the
    /// state query timeout.
    ///
    /// The answer is the state message echoing this request's correlation
    /// id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`](crate::error::Error::NotConnected)
    /// without a live session, or [`ProtocolError::Timeout`] if no answer
    /// arrives in time.
    pub async fn request_state(&self) -> Result<Snapshot<M>> {
        let (correlation_id, ack) = self.publish_command(&ControlCommand::GetState, true)?;
        let timeout = self.inner.policy.state_query_timeout;

        let answered = match ack {
            Some(ack) => matches!(tokio::time::timeout(timeout, ack).await, Ok(Ok(()))),
            None => false,
        };
        if !answered {
            self.inner.pending.remove(&correlation_id);
            return Err(ProtocolError::Timeout(millis(timeout)).into());
        }

        self.current_state()
            .ok_or_else(|| ProtocolError::ChannelClosed("device state".to_string()).into())
    }

    /// Commands published and not yet acknowledged.
    #[must_use]
    pub fn pending_commands(&self) -> &PendingCommands {
        &self.inner.pending
    }

    /// Feeds a raw message through the inbound path, exactly as if the
    /// session had received it.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        self.inner.on_message(topic, payload);
    }

    fn publish_command(
        &self,
        command: &ControlCommand,
        wait: bool,
    ) -> Result<(String, Option<oneshot::Receiver<()>>)> {
        let correlation_id = next_correlation_id();
        let mut payload = command.payload();
        payload.insert(
            CORRELATION_KEY.to_string(),
            Value::String(correlation_id.clone()),
        );
        let bytes = serde_json::to_vec(&payload).map_err(ParseError::from)?;

        let ack = self.inner.pending.insert(&correlation_id, command.name(), wait);
        let topic = self.inner.topics.control(command.name());
        if let Err(e) = self.inner.session.publish(&topic, bytes, false) {
            self.inner.pending.remove(&correlation_id);
            return Err(e);
        }
        tracing::debug!(
            device = %self.inner.id,
            command = command.name(),
            correlation_id = %correlation_id,
            "Command published"
        );
        Ok((correlation_id, ack))
    }
}

impl<M: DeviceModel> Inner<M> {
    /// Tracks a state message from the device.
    ///
    /// A message stamped before the snapshot already held is dropped; its
    /// correlation id still counts as an answer.
    fn track_state(&self, payload: &Payload) {
        let changed = match M::parse_update(payload) {
            Ok(update) => {
                let stamp = fields::timestamp(payload);
                let mut guard = self.latest.lock();
                let latest: &mut Option<Snapshot<M>> = &mut guard;
                let stale = stamp.is_some_and(|at| latest.as_ref().is_some_and(|s| at < s.last_updated));
                if stale {
                    tracing::trace!(device = %self.id, "Ignoring stale state message");
                    None
                } else {
                    let mut next = latest.clone().unwrap_or_else(|| Snapshot {
                        device_id: self.id.clone(),
                        state: M::default(),
                        last_updated: Utc::now(),
                    });
                    next.state.apply(&update);
                    next.last_updated = stamp.unwrap_or_else(Utc::now);
                    let changed = latest.as_ref() != Some(&next);
                    *latest = Some(next.clone());
                    self.state_tx.send_replace(Some(next.clone()));
                    changed.then_some(next)
                }
            }
            Err(e) => {
                tracing::warn!(device = %self.id, error = %e, "Ignoring state message");
                None
            }
        };

        if let Some(id) = correlation_id(payload)
            && self.pending.acknowledge(id)
        {
            tracing::debug!(device = %self.id, correlation_id = %id, "Acknowledged");
        }

        if let Some(snapshot) = changed {
            self.listeners.dispatch(&snapshot);
        }
    }
}

impl<M: DeviceModel> SessionHandler for Inner<M> {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        if self.topics.route(topic) != Some(Route::State) {
            tracing::trace!(device = %self.id, topic = %topic, "Ignoring topic");
            return;
        }
        match decode_payload(payload) {
            Ok(payload) => self.track_state(&payload),
            Err(e) => {
                tracing::warn!(device = %self.id, topic = %topic, error = %e, "Dropping malformed message");
            }
        }
    }

    fn on_connected(&self) {
        tracing::debug!(device = %self.id, "Controller attached");
    }
}

impl<M: DeviceModel> Subscribable for Controller<M> {
    type Event = Snapshot<M>;

    fn on_state_changed<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Self::Event) + Send + Sync + 'static,
    {
        self.subscribe_state(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }
}

impl<M: DeviceModel> std::fmt::Debug for Controller<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.inner.id)
            .field("kind", &M::KIND)
            .field("connection", &self.inner.session.state())
            .finish_non_exhaustive()
    }
}
