// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport abstraction between sessions and brokers.
//!
//! A [`Connector`] opens one [`Connection`] per connection attempt. The
//! connection is split in two halves: a cloneable, non-blocking
//! [`Transport`] used to publish and subscribe, and an [`EventStream`] that
//! the session task drives.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::ConnectionParams;
use crate::error::ProtocolError;

/// A boxed future returned by [`EventStream::next_event`].
pub type EventFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportEvent, ProtocolError>> + Send + 'a>>;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the session.
    Connected,
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
    /// The broker closed the session.
    Closed,
    /// Protocol housekeeping with nothing for the session to do.
    Idle,
}

/// Outbound half of a connection.
///
/// Every method queues the request and returns without waiting for the
/// broker, so it may be called from synchronous code.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be queued.
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), ProtocolError>;

    /// Subscribes to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be queued.
    fn subscribe(&self, filter: &str) -> Result<(), ProtocolError>;

    /// Asks the broker to close the session.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be queued.
    fn disconnect(&self) -> Result<(), ProtocolError>;
}

/// Inbound half of a connection.
pub trait EventStream: Send {
    /// Waits for the next event. An error means the connection is unusable.
    fn next_event(&mut self) -> EventFuture<'_>;
}

/// An opened connection.
pub struct Connection {
    /// Outbound half.
    pub transport: Arc<dyn Transport>,
    /// Inbound half.
    pub events: Box<dyn EventStream>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Opens connections to a broker.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Opens a fresh connection for `client_id`.
    ///
    /// The connection is not established yet: the session waits for
    /// [`TransportEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the parameters are unusable or the broker
    /// refuses outright.
    fn open(&self, client_id: &str, params: &ConnectionParams) -> Result<Connection, ProtocolError>;
}
