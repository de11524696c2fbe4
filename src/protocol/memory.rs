// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process broker.
//!
//! [`MemoryBroker`] implements the subset of MQTT the devices rely on:
//! wildcard subscriptions, retained messages delivered on subscribe, and
//! delivery to every matching session including the publisher. It also
//! keeps a bounded log of recent publishes and can drop sessions or refuse
//! new ones, which makes reconnect behavior observable without a network.
//!
//! The log holds the last [`DEFAULT_LOG_CAPACITY`] messages; use
//! [`MemoryBroker::with_log_capacity`] to change that, or pass `0` to turn
//! it off.
//!
//! # Examples
//!
//! ```
//! use homesync_lib::protocol::MemoryBroker;
//!
//! let broker = MemoryBroker::new();
//! broker.publish("home/lights/porch/state", br#"{"power":"on"}"#.to_vec(), true);
//! assert!(broker.retained("home/lights/porch/state").is_some());
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::topics::topic_matches;
use super::transport::{Connection, Connector, EventFuture, EventStream, Transport, TransportEvent};
use crate::config::ConnectionParams;
use crate::error::ProtocolError;

/// Number of publishes a [`MemoryBroker::new`] broker remembers.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// A message the broker accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Whether the retain flag was set.
    pub retain: bool,
}

impl PublishedMessage {
    /// Parses the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is not valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug)]
struct SessionEntry {
    client_id: String,
    filters: BTreeSet<String>,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Debug)]
struct BrokerState {
    next_session: u64,
    sessions: HashMap<u64, SessionEntry>,
    retained: BTreeMap<String, Vec<u8>>,
    log: VecDeque<PublishedMessage>,
    log_capacity: usize,
    available: bool,
}

impl BrokerState {
    fn route(&mut self, topic: &str, payload: &[u8], retain: bool) {
        if retain {
            if payload.is_empty() {
                self.retained.remove(topic);
            } else {
                self.retained.insert(topic.to_string(), payload.to_vec());
            }
        }
        if self.log_capacity > 0 {
            if self.log.len() == self.log_capacity {
                self.log.pop_front();
            }
            self.log.push_back(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                retain,
            });
        }
        for session in self.sessions.values() {
            if session.filters.iter().any(|f| topic_matches(f, topic)) {
                let _ = session.tx.send(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                });
            }
        }
    }
}

/// A cloneable handle to an in-process broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Creates an empty, available broker that logs the last
    /// [`DEFAULT_LOG_CAPACITY`] publishes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Creates an empty, available broker that logs the last `capacity`
    /// publishes. Zero disables the log.
    #[must_use]
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BrokerState {
                next_session: 1,
                sessions: HashMap::new(),
                retained: BTreeMap::new(),
                log: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                log_capacity: capacity,
                available: true,
            })),
        }
    }

    /// Returns a connector that opens sessions on this broker.
    #[must_use]
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            broker: self.clone(),
        })
    }

    /// Publishes a message as an outside client would.
    pub fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) {
        self.inner.lock().route(topic, &payload, retain);
    }

    /// Returns the retained payload of a topic.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.inner.lock().retained.get(topic).cloned()
    }

    /// Returns the logged messages, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().log.iter().cloned().collect()
    }

    /// Returns the messages published on topics matching `filter`.
    #[must_use]
    pub fn published_matching(&self, filter: &str) -> Vec<PublishedMessage> {
        self.inner
            .lock()
            .log
            .iter()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect()
    }

    /// Forgets the publish log. Retained messages are kept.
    pub fn clear_log(&self) {
        self.inner.lock().log.clear();
    }

    /// Returns the filters held by the live session of `client_id`.
    #[must_use]
    pub fn subscriptions(&self, client_id: &str) -> Option<BTreeSet<String>> {
        self.inner
            .lock()
            .sessions
            .values()
            .find(|s| s.client_id == client_id)
            .map(|s| s.filters.clone())
    }

    /// Returns the client ids of the live sessions.
    #[must_use]
    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .inner
            .lock()
            .sessions
            .values()
            .map(|s| s.client_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Closes every live session as if the broker had restarted, and
    /// returns how many were closed.
    pub fn drop_connections(&self) -> usize {
        let sessions: Vec<_> = self.inner.lock().sessions.drain().collect();
        for (_, session) in &sessions {
            let _ = session.tx.send(TransportEvent::Closed);
        }
        tracing::debug!(count = sessions.len(), "Dropped broker sessions");
        sessions.len()
    }

    /// Makes the broker accept or refuse new sessions. Live sessions are not
    /// affected.
    pub fn set_available(&self, available: bool) {
        self.inner.lock().available = available;
    }

    fn open(&self, client_id: &str) -> Result<Connection, ProtocolError> {
        let mut state = self.inner.lock();
        if !state.available {
            return Err(ProtocolError::ConnectionFailed(
                "broker unavailable".to_string(),
            ));
        }
        let session = state.next_session;
        state.next_session += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);
        state.sessions.insert(
            session,
            SessionEntry {
                client_id: client_id.to_string(),
                filters: BTreeSet::new(),
                tx,
            },
        );

        Ok(Connection {
            transport: Arc::new(MemoryTransport {
                broker: self.clone(),
                session,
            }),
            events: Box::new(MemoryEvents { rx }),
        })
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector returned by [`MemoryBroker::connector`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    broker: MemoryBroker,
}

impl Connector for MemoryConnector {
    fn open(&self, client_id: &str, _params: &ConnectionParams) -> Result<Connection, ProtocolError> {
        self.broker.open(client_id)
    }
}

#[derive(Debug)]
struct MemoryTransport {
    broker: MemoryBroker,
    session: u64,
}

impl MemoryTransport {
    fn closed() -> ProtocolError {
        ProtocolError::ConnectionLost("session closed".to_string())
    }
}

impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), ProtocolError> {
        let mut state = self.broker.inner.lock();
        if !state.sessions.contains_key(&self.session) {
            return Err(Self::closed());
        }
        state.route(topic, &payload, retain);
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<(), ProtocolError> {
        let mut guard = self.broker.inner.lock();
        let state = &mut *guard;
        let session = state
            .sessions
            .get_mut(&self.session)
            .ok_or_else(Self::closed)?;
        session.filters.insert(filter.to_string());
        for (topic, payload) in &state.retained {
            if topic_matches(filter, topic) {
                let _ = session.tx.send(TransportEvent::Message {
                    topic: topic.clone(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ProtocolError> {
        self.broker.inner.lock().sessions.remove(&self.session);
        Ok(())
    }
}

struct MemoryEvents {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventStream for MemoryEvents {
    fn next_event(&mut self) -> EventFuture<'_> {
        Box::pin(async move { Ok(self.rx.recv().await.unwrap_or(TransportEvent::Closed)) })
    }
}
