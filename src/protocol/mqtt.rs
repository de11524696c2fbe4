// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport backed by `rumqttc`.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};

use super::transport::{Connection, Connector, EventFuture, EventStream, Transport, TransportEvent};
use crate::config::ConnectionParams;
use crate::error::ProtocolError;

/// Default capacity of the client request channel.
const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Opens MQTT connections.
///
/// Every connection uses a clean session and QoS 1 (at least once) for
/// both publishes and subscriptions.
///
/// # Examples
///
/// ```no_run
/// use homesync_lib::config::{ConnectionParams, DeviceOptions};
/// use homesync_lib::device::Bulb;
/// use homesync_lib::protocol::MqttConnector;
///
/// # async fn example() -> homesync_lib::Result<()> {
/// let options = DeviceOptions::new(ConnectionParams::new("localhost").with_port(1883));
/// let bulb = Bulb::new("living_room", MqttConnector::shared(), options);
/// bulb.connect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MqttConnector {
    request_capacity: usize,
}

impl MqttConnector {
    /// Creates a connector with the default request capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_capacity: DEFAULT_REQUEST_CAPACITY,
        }
    }

    /// Creates a connector ready to hand to devices or a registry.
    #[must_use]
    pub fn shared() -> Arc<dyn Connector> {
        Arc::new(Self::new())
    }

    /// Sets how many requests may queue before the event loop drains them.
    #[must_use]
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MqttConnector {
    fn open(&self, client_id: &str, params: &ConnectionParams) -> Result<Connection, ProtocolError> {
        let (host, port) = params.endpoint()?;

        let mut mqtt_options = MqttOptions::new(client_id, host.clone(), port);
        mqtt_options.set_keep_alive(params.keep_alive().max(Duration::from_secs(1)));
        mqtt_options.set_clean_session(true);

        if let Some((username, password)) = params.credentials() {
            mqtt_options.set_credentials(username, password);
        }

        tracing::debug!(client_id = %client_id, host = %host, port, "Opening MQTT connection");

        let (client, event_loop) = AsyncClient::new(mqtt_options, self.request_capacity);

        Ok(Connection {
            transport: Arc::new(MqttTransport { client }),
            events: Box::new(MqttEvents { event_loop }),
        })
    }
}

#[derive(Debug)]
struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), ProtocolError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(ProtocolError::Mqtt)
    }

    fn subscribe(&self, filter: &str) -> Result<(), ProtocolError> {
        self.client
            .try_subscribe(filter, QoS::AtLeastOnce)
            .map_err(ProtocolError::Mqtt)
    }

    fn disconnect(&self) -> Result<(), ProtocolError> {
        self.client.try_disconnect().map_err(ProtocolError::Mqtt)
    }
}

struct MqttEvents {
    event_loop: EventLoop,
}

impl EventStream for MqttEvents {
    fn next_event(&mut self) -> EventFuture<'_> {
        Box::pin(async move {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    if connack.code == ConnectReturnCode::Success {
                        tracing::debug!(?connack, "MQTT connected");
                        Ok(TransportEvent::Connected)
                    } else {
                        Err(ProtocolError::ConnectionFailed(format!(
                            "broker refused connection: {:?}",
                            connack.code
                        )))
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    tracing::debug!(?suback, "MQTT subscription acknowledged");
                    Ok(TransportEvent::Idle)
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => Ok(TransportEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                }),
                Ok(Event::Incoming(Packet::Disconnect)) => Ok(TransportEvent::Closed),
                Ok(_) => Ok(TransportEvent::Idle),
                Err(e) => Err(ProtocolError::ConnectionLost(e.to_string())),
            }
        })
    }
}
