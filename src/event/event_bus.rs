// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event bus for broadcasting device events.

use tokio::sync::broadcast;

use super::DeviceEvent;

/// Default channel capacity for the event bus.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Event bus for broadcasting device events to multiple subscribers.
///
/// Every subscriber gets its own copy of each event.
///
/// # Capacity
///
/// The bus has a fixed capacity (default 256, see
/// [`RegistryConfig::event_capacity`](crate::config::RegistryConfig::event_capacity)).
/// A subscriber that falls behind loses the oldest events and sees
/// `RecvError::Lagged`.
///
/// # Examples
///
/// ```
/// use homesync_lib::event::{DeviceEvent, EventBus};
///
/// let bus = EventBus::with_capacity(16);
/// let mut rx = bus.subscribe();
///
/// bus.publish(DeviceEvent::device_removed("porch"));
/// assert_eq!(rx.try_recv().unwrap().device_id(), "porch");
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// Creates a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a new event bus with the specified capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events that can be buffered
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to device events.
    ///
    /// Returns a receiver that will receive all events published after
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event to all subscribers.
    ///
    /// If there are no subscribers, the event is silently discarded.
    /// If the channel is full for a slow subscriber, that subscriber
    /// will lose events.
    pub fn publish(&self, event: DeviceEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    /// Publishes an event and returns how many receivers got it.
    #[must_use]
    pub fn publish_counted(&self, event: DeviceEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
