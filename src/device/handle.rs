// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device state machine.

use std::cell::Cell;
use std::sync::{Arc, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::command::{CORRELATION_KEY, ControlCommand};
use crate::config::DeviceOptions;
use crate::error::{Error, Result};
use crate::protocol::{ConnectionState, Connector, DeviceTopics, Session, SessionHandler};
use crate::state::{DeviceModel, Payload, Snapshot};
use crate::subscription::{ListenerRegistry, Subscribable, SubscriptionId};
use crate::types::DeviceKind;

/// A live device of kind `M`.
///
/// The handle is cheap to clone; clones share the same state, listeners
/// and session. State is guarded by one lock per device: every mutation
/// and every [`current_state`](Self::current_state) happens under a single
/// acquisition, and the lock is released before listeners run and before
/// anything is published.
///
/// Every mutation gets the next revision. Listeners and the broker see
/// revisions in increasing order: a listener is never handed a snapshot
/// older than one it already saw, and the retained snapshot is always the
/// newest at the time of publishing.
pub struct DeviceHandle<M: DeviceModel> {
    pub(super) inner: Arc<Inner<M>>,
}

/// The state together with its revision.
pub(super) struct Versioned<M> {
    pub(super) snapshot: Snapshot<M>,
    pub(super) revision: u64,
}

pub(super) struct Inner<M: DeviceModel> {
    pub(super) id: String,
    pub(super) topics: DeviceTopics,
    pub(super) state: Mutex<Versioned<M>>,
    pub(super) state_tx: watch::Sender<Snapshot<M>>,
    pub(super) listeners: ListenerRegistry<Snapshot<M>>,
    pub(super) session: Session,
    /// Serializes fan-out and publishing; holds the last revision handed to
    /// listeners. Reentrant so a listener may mutate its own device.
    fanout: ReentrantMutex<Cell<u64>>,
}

impl<M: DeviceModel> Clone for DeviceHandle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) fn client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("homesync_{}", &suffix[..12])
}

/// Wall-clock time, strictly after `previous`.
pub(super) fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + TimeDelta::nanoseconds(1)
    }
}

impl<M: DeviceModel> DeviceHandle<M> {
    /// Creates a disconnected device in its default state.
    #[must_use]
    pub fn new(id: impl Into<String>, connector: Arc<dyn Connector>, options: DeviceOptions) -> Self {
        let id = id.into();
        let topics = DeviceTopics::new(M::KIND, &id);
        let initial = Snapshot {
            device_id: id.clone(),
            state: M::default(),
            last_updated: Utc::now(),
        };
        let (state_tx, _) = watch::channel(initial.clone());
        let session = Session::new(
            client_id(),
            connector,
            options.params,
            options.session,
            topics.subscriptions(),
        );

        Self {
            inner: Arc::new(Inner {
                id,
                topics,
                state: Mutex::new(Versioned {
                    snapshot: initial,
                    revision: 0,
                }),
                state_tx,
                listeners: ListenerRegistry::new(),
                session,
                fanout: ReentrantMutex::new(Cell::new(0)),
            }),
        }
    }

    /// Device identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        M::KIND
    }

    /// Topics of this device.
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

    /// Watches connection state changes.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.session.watch()
    }

    /// Connects to the broker, subscribes, and publishes the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConnectionFailed`](crate::error::ProtocolError::ConnectionFailed)
    /// if the session could not be established within the connect budget.
    pub async fn connect(&self) -> Result<()> {
        let weak: Weak<Inner<M>> = Arc::downgrade(&self.inner);
        let handler: Weak<dyn SessionHandler> = weak;
        self.inner.session.connect(handler).await
    }

    /// Disconnects. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.session.disconnect().await;
    }

    /// Returns an atomic snapshot of the state.
    #[must_use]
    pub fn current_state(&self) -> Snapshot<M> {
        self.inner.state.lock().snapshot.clone()
    }

    /// Revision of the current state. Starts at zero and grows by one with
    /// every applied mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.state.lock().revision
    }

    /// Watches the state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Snapshot<M>> {
        self.inner.state_tx.subscribe()
    }

    /// Applies the fields present in `update`, then notifies listeners and
    /// publishes the new snapshot. An empty update changes nothing.
    pub fn update_state(&self, update: &M::Update) -> Snapshot<M> {
        if M::is_empty(update) {
            return self.current_state();
        }
        self.inner.commit(update, None)
    }

    /// Validates a JSON patch and applies it.
    ///
    /// Validation is all-or-nothing: if any field is invalid, nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueError`](crate::error::ValueError) for the first
    /// invalid field.
    pub fn update_from_json(&self, payload: &Payload) -> Result<Snapshot<M>> {
        let update = M::parse_update(payload).inspect_err(|e| {
            tracing::warn!(device = %self.inner.id, error = %e, "Rejected state update");
        })?;
        Ok(self.update_state(&update))
    }

    /// Performs a control command locally.
    ///
    /// `get_state` re-publishes the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnsupportedOperation`](crate::error::DeviceError::UnsupportedOperation)
    /// if this kind cannot perform the command; the state is left unchanged.
    pub fn execute(&self, command: &ControlCommand) -> Result<Snapshot<M>> {
        let update = M::update_for(command).inspect_err(|e| {
            tracing::warn!(device = %self.inner.id, command = command.name(), error = %e, "Rejected control command");
        })?;
        match update {
            Some(update) => Ok(self.update_state(&update)),
            None => Ok(self.inner.publish_latest(None)),
        }
    }

    /// Feeds a raw message through the inbound path, exactly as if the
    /// session had received it.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        self.inner.on_message(topic, payload);
    }
}

impl<M: DeviceModel> Inner<M> {
    /// Applies a local mutation under the lock, then fans out and publishes.
    pub(super) fn commit(&self, update: &M::Update, correlation_id: Option<&str>) -> Snapshot<M> {
        let (snapshot, revision) = {
            let mut current = self.state.lock();
            current.snapshot.state.apply(update);
            current.snapshot.last_updated = next_stamp(current.snapshot.last_updated);
            current.revision += 1;
            self.state_tx.send_replace(current.snapshot.clone());
            (current.snapshot.clone(), current.revision)
        };
        tracing::debug!(device = %self.id, revision, ?update, "State updated");
        self.notify(&snapshot, revision);
        self.publish_latest(correlation_id);
        snapshot
    }

    /// Hands a snapshot to the listeners unless a newer revision was
    /// already handed out.
    pub(super) fn notify(&self, snapshot: &Snapshot<M>, revision: u64) {
        let notified = self.fanout.lock();
        if revision <= notified.get() {
            tracing::trace!(device = %self.id, revision, "Superseded before fan-out");
            return;
        }
        notified.set(revision);
        self.listeners.dispatch(snapshot);
    }

    /// Publishes the newest snapshot as the retained state and returns it.
    ///
    /// Publishes are serialized and always read the state afresh, so the
    /// broker never receives a snapshot older than one already sent.
    pub(super) fn publish_latest(&self, correlation_id: Option<&str>) -> Snapshot<M> {
        let _order = self.fanout.lock();
        let snapshot = self.state.lock().snapshot.clone();
        self.publish_snapshot(&snapshot, correlation_id);
        snapshot
    }

    fn publish_snapshot(&self, snapshot: &Snapshot<M>, correlation_id: Option<&str>) {
        let mut value = snapshot.to_json();
        if let (Some(id), Some(map)) = (correlation_id, value.as_object_mut()) {
            map.insert(CORRELATION_KEY.to_string(), Value::String(id.to_string()));
        }
        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(device = %self.id, error = %e, "Could not encode snapshot");
                return;
            }
        };
        match self.session.publish(&self.topics.state(), bytes, true) {
            Ok(()) => {}
            Err(Error::NotConnected) => {
                tracing::debug!(device = %self.id, "Not connected, snapshot not published");
            }
            Err(e) => tracing::warn!(device = %self.id, error = %e, "Failed to publish snapshot"),
        }
    }
}

impl<M: DeviceModel> Subscribable for DeviceHandle<M> {
    type Event = Snapshot<M>;

    fn on_state_changed<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Self::Event) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }
}

impl<M: DeviceModel> std::fmt::Debug for DeviceHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.inner.id)
            .field("kind", &M::KIND)
            .field("connection", &self.inner.session.state())
            .finish_non_exhaustive()
    }
}
