// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listener fan-out for device state changes.
//!
//! - [`SubscriptionId`] - A unique identifier for a subscription, used to unsubscribe
//! - [`ListenerRegistry`] - Ordered listener list with panic-isolated dispatch
//! - [`Subscribable`] - Trait for types that support state subscriptions
//!
//! Listeners run synchronously on the thread that applied the change, after
//! the mutation and before the change is published to the broker.

mod callback;
mod subscribable;

pub use callback::{ListenerRegistry, SubscriptionId};
pub use subscribable::Subscribable;
