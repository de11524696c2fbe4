// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport session with bounded connect and reconnect.
//!
//! A [`Session`] owns one background task per connection lifetime. The task
//! drives the connection's event stream, routes inbound messages to a
//! [`SessionHandler`] and walks the state machine:
//!
//! ```text
//! Disconnected ─connect()─▶ Connecting ─ConnAck─▶ Connected
//!                               │                   │ loss
//!                               ▼ budget spent      ▼
//!                            Failed ◀─exhausted─ Reconnecting { attempt }
//! ```
//!
//! The handler is held by weak reference, so the session never keeps its
//! device alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::transport::{Connection, Connector, EventStream, Transport, TransportEvent};
use crate::config::{ConnectionParams, SessionPolicy};
use crate::error::{Error, ProtocolError, Result};

/// How long a closing session keeps draining its event stream so the
/// disconnect request reaches the broker.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Connection state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    Disconnected,
    /// Initial connection in progress.
    Connecting,
    /// Session established and subscribed.
    Connected,
    /// Reconnecting after an unexpected loss.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
    },
    /// Connecting or reconnecting gave up.
    Failed(String),
}

impl ConnectionState {
    /// Returns true if the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if the session gave up.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Receives what a session delivers.
pub trait SessionHandler: Send + Sync {
    /// A message arrived on a subscribed topic.
    fn on_message(&self, topic: &str, payload: &[u8]);

    /// The session (re)connected and re-subscribed.
    fn on_connected(&self);
}

struct Shared {
    client_id: String,
    connector: Arc<dyn Connector>,
    params: ConnectionParams,
    policy: SessionPolicy,
    topics: Vec<String>,
    state_tx: watch::Sender<ConnectionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn open(&self) -> std::result::Result<Connection, ProtocolError> {
        self.connector.open(&self.client_id, &self.params)
    }

    fn activate(&self, transport: &Arc<dyn Transport>, handler: &Weak<dyn SessionHandler>) {
        for filter in &self.topics {
            match transport.subscribe(filter) {
                Ok(()) => tracing::debug!(client_id = %self.client_id, filter = %filter, "Subscribed"),
                Err(e) => tracing::warn!(
                    client_id = %self.client_id,
                    filter = %filter,
                    error = %e,
                    "Subscription request failed"
                ),
            }
        }
        *self.transport.write() = Some(Arc::clone(transport));
        self.set_state(ConnectionState::Connected);
        tracing::info!(client_id = %self.client_id, "Session connected");

        if let Some(handler) = handler.upgrade() {
            handler.on_connected();
        }
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A transport session subscribed to a fixed topic set.
pub struct Session {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Session {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        params: ConnectionParams,
        policy: SessionPolicy,
        topics: Vec<String>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                client_id: client_id.into(),
                connector,
                params,
                policy,
                topics,
                state_tx,
                transport: RwLock::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// MQTT client id of this session.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    /// Filters subscribed on every (re)connect.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.shared.topics
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Returns true if the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state_tx.borrow().is_connected()
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Establishes the session, routing inbound traffic to `handler`.
    ///
    /// Blocks until the broker accepts the session or the connect budget
    /// (`connect_attempts` × `connect_interval`) is spent. Calling it while
    /// a session is running waits for that session instead of starting a
    /// second one.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConnectionFailed`] if the session could not
    /// be established.
    pub async fn connect(&self, handler: Weak<dyn SessionHandler>) -> Result<()> {
        {
            let mut worker = self.worker.lock();
            let running = worker.as_ref().is_some_and(|w| !w.handle.is_finished());
            if !running {
                self.shared.set_state(ConnectionState::Connecting);
                tracing::info!(client_id = %self.shared.client_id, "Connecting");
                let (shutdown, shutdown_rx) = watch::channel(false);
                let handle = tokio::spawn(run(Arc::clone(&self.shared), handler, shutdown_rx));
                *worker = Some(Worker { shutdown, handle });
            }
        }

        let mut state_rx = self.shared.state_tx.subscribe();
        let settled = state_rx
            .wait_for(|s| {
                matches!(
                    s,
                    ConnectionState::Connected
                        | ConnectionState::Failed(_)
                        | ConnectionState::Disconnected
                )
            })
            .await
            .map(|s| s.clone())
            .map_err(|_| ProtocolError::ChannelClosed("session state".to_string()))?;

        match settled {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Failed(reason) => Err(ProtocolError::ConnectionFailed(reason).into()),
            _ => Err(ProtocolError::ConnectionFailed("disconnected while connecting".to_string()).into()),
        }
    }

    /// Stops the session. Idempotent.
    ///
    /// Preempts any connect or reconnect in progress and returns once the
    /// background task has finished.
    pub async fn disconnect(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                tracing::warn!(client_id = %self.shared.client_id, error = %e, "Session task ended abnormally");
            }
        }
        self.shared.transport.write().take();

        let was = self.shared.state_tx.send_replace(ConnectionState::Disconnected);
        if was != ConnectionState::Disconnected {
            tracing::info!(client_id = %self.shared.client_id, "Session disconnected");
        }
    }

    /// Publishes through the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without a live connection, or the
    /// transport's error if the request cannot be queued.
    pub fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        let transport = self.shared.transport.read().clone();
        let Some(transport) = transport else {
            return Err(Error::NotConnected);
        };
        tracing::debug!(topic = %topic, bytes = payload.len(), retain, "Publishing");
        transport.publish(topic, payload, retain)?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.shutdown.send(true);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.shared.client_id)
            .field("state", &self.state())
            .field("topics", &self.shared.topics)
            .finish_non_exhaustive()
    }
}

enum Outcome<T> {
    Done(T),
    Failed(String),
    Shutdown,
}

enum Exit {
    Lost(String),
    Shutdown,
    Orphaned,
}

async fn run(
    shared: Arc<Shared>,
    handler: Weak<dyn SessionHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut conn = match establish(&shared, &mut shutdown).await {
        Outcome::Done(conn) => conn,
        Outcome::Failed(reason) => {
            tracing::error!(client_id = %shared.client_id, reason = %reason, "Could not connect");
            shared.set_state(ConnectionState::Failed(reason));
            return;
        }
        Outcome::Shutdown => return,
    };

    loop {
        shared.activate(&conn.transport, &handler);

        let reason = match pump(&shared, &mut conn, &handler, &mut shutdown).await {
            Exit::Shutdown => {
                shared.transport.write().take();
                close(conn).await;
                return;
            }
            Exit::Orphaned => {
                shared.transport.write().take();
                close(conn).await;
                shared.set_state(ConnectionState::Disconnected);
                tracing::info!(client_id = %shared.client_id, "Session disconnected");
                return;
            }
            Exit::Lost(reason) => reason,
        };

        shared.transport.write().take();
        tracing::warn!(client_id = %shared.client_id, reason = %reason, "Connection lost");

        conn = match reconnect(&shared, &mut shutdown, reason).await {
            Outcome::Done(conn) => conn,
            Outcome::Failed(reason) => {
                tracing::error!(
                    client_id = %shared.client_id,
                    reason = %reason,
                    "Reconnection attempts exhausted"
                );
                shared.set_state(ConnectionState::Failed(reason));
                return;
            }
            Outcome::Shutdown => return,
        };
    }
}

/// Waits for the broker to accept the session.
async fn wait_connected(events: &mut dyn EventStream) -> std::result::Result<(), ProtocolError> {
    loop {
        match events.next_event().await? {
            TransportEvent::Connected => return Ok(()),
            TransportEvent::Closed => {
                return Err(ProtocolError::ConnectionFailed("closed by broker".to_string()));
            }
            TransportEvent::Message { .. } | TransportEvent::Idle => {}
        }
    }
}

enum Step {
    Connected,
    Pending,
    Failed(String),
    Shutdown,
}

/// Initial connect: `connect_attempts` checks spaced by `connect_interval`.
///
/// A connection that is merely slow is kept across checks; one that fails
/// is reopened at the next check.
async fn establish(shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> Outcome<Connection> {
    let policy = &shared.policy;
    let mut pending: Option<Connection> = None;
    let mut last_error = "timed out waiting for broker".to_string();

    for attempt in 1..=policy.connect_attempts.max(1) {
        let deadline = Instant::now() + policy.connect_interval;

        if pending.is_none() {
            match shared.open() {
                Ok(conn) => pending = Some(conn),
                Err(e) => {
                    tracing::warn!(client_id = %shared.client_id, attempt, error = %e, "Connect attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        let step = match pending.as_mut() {
            Some(conn) => tokio::select! {
                _ = shutdown.changed() => Step::Shutdown,
                r = time::timeout_at(deadline, wait_connected(conn.events.as_mut())) => match r {
                    Ok(Ok(())) => Step::Connected,
                    Ok(Err(e)) => Step::Failed(e.to_string()),
                    Err(_) => Step::Pending,
                },
            },
            None => Step::Pending,
        };

        match step {
            Step::Connected => {
                if let Some(conn) = pending.take() {
                    return Outcome::Done(conn);
                }
            }
            Step::Shutdown => return Outcome::Shutdown,
            Step::Failed(reason) => {
                tracing::warn!(client_id = %shared.client_id, attempt, reason = %reason, "Connect attempt failed");
                last_error = reason;
                pending = None;
            }
            Step::Pending => {
                tracing::debug!(client_id = %shared.client_id, attempt, "Still waiting for broker");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => return Outcome::Shutdown,
            () = time::sleep_until(deadline) => {}
        }
    }

    Outcome::Failed(last_error)
}

/// Reconnect after a loss, following the reconnection policy.
async fn reconnect(
    shared: &Shared,
    shutdown: &mut watch::Receiver<bool>,
    reason: String,
) -> Outcome<Connection> {
    let policy = &shared.policy.reconnect;
    let budget = shared.policy.connect_budget();
    let mut last_error = reason;
    let mut attempt = 0;

    while policy.should_retry(attempt) {
        let delay = policy.backoff;
        attempt += 1;
        shared.set_state(ConnectionState::Reconnecting { attempt });
        tracing::warn!(
            client_id = %shared.client_id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );

        tokio::select! {
            _ = shutdown.changed() => return Outcome::Shutdown,
            () = time::sleep(delay) => {}
        }

        let mut conn = match shared.open() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(client_id = %shared.client_id, attempt, error = %e, "Reconnect attempt failed");
                last_error = e.to_string();
                continue;
            }
        };

        let step = tokio::select! {
            _ = shutdown.changed() => Step::Shutdown,
            r = time::timeout(budget, wait_connected(conn.events.as_mut())) => match r {
                Ok(Ok(())) => Step::Connected,
                Ok(Err(e)) => Step::Failed(e.to_string()),
                Err(_) => Step::Failed("timed out waiting for broker".to_string()),
            },
        };

        match step {
            Step::Connected => return Outcome::Done(conn),
            Step::Shutdown => return Outcome::Shutdown,
            Step::Failed(reason) => {
                tracing::warn!(client_id = %shared.client_id, attempt, reason = %reason, "Reconnect attempt failed");
                last_error = reason;
            }
            Step::Pending => {}
        }
    }

    Outcome::Failed(last_error)
}

/// Routes events until the connection drops or shutdown is requested.
async fn pump(
    shared: &Shared,
    conn: &mut Connection,
    handler: &Weak<dyn SessionHandler>,
    shutdown: &mut watch::Receiver<bool>,
) -> Exit {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => return Exit::Shutdown,
            event = conn.events.next_event() => event,
        };

        match event {
            Ok(TransportEvent::Message { topic, payload }) => {
                let Some(handler) = handler.upgrade() else {
                    tracing::debug!(client_id = %shared.client_id, "Handler dropped, stopping session");
                    return Exit::Orphaned;
                };
                tracing::debug!(topic = %topic, bytes = payload.len(), "Received message");
                handler.on_message(&topic, &payload);
            }
            Ok(TransportEvent::Connected) => shared.activate(&conn.transport, handler),
            Ok(TransportEvent::Idle) => {}
            Ok(TransportEvent::Closed) => return Exit::Lost("closed by broker".to_string()),
            Err(e) => return Exit::Lost(e.to_string()),
        }
    }
}

/// Sends a disconnect request and drains the stream briefly so it is
/// flushed.
async fn close(mut conn: Connection) {
    if let Err(e) = conn.transport.disconnect() {
        tracing::debug!(error = %e, "Disconnect request failed");
        return;
    }
    let _ = time::timeout(CLOSE_GRACE, async {
        while let Ok(TransportEvent::Idle | TransportEvent::Message { .. } | TransportEvent::Connected) =
            conn.events.next_event().await
        {}
    })
    .await;
}
