// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for types that announce state changes.

use crate::subscription::SubscriptionId;

/// Trait for types that notify listeners of state changes.
///
/// # Examples
///
/// ```
/// use homesync_lib::device::Bulb;
/// use homesync_lib::protocol::MemoryBroker;
/// use homesync_lib::subscription::Subscribable;
///
/// let broker = MemoryBroker::new();
/// let bulb = Bulb::new("porch", broker.connector(), Default::default());
///
/// let sub_id = bulb.on_state_changed(|snapshot| {
///     println!("{} is now {}", snapshot.device_id, snapshot.state.power);
/// });
/// assert!(bulb.unsubscribe(sub_id));
/// ```
pub trait Subscribable {
    /// The value handed to listeners.
    type Event;

    /// Registers a listener called after every state change, in
    /// registration order.
    fn on_state_changed<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Self::Event) + Send + Sync + 'static;

    /// Unregisters a listener. Returns `true` if it was registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
