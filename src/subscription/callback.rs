// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listener storage and synchronous fan-out.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`ListenerRegistry`] - Ordered listener list with isolated dispatch

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Unique identifier for a subscription.
///
/// Returned when registering a listener and used to unsubscribe later. IDs
/// are unique within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Listeners of one event type, kept in registration order.
///
/// [`dispatch`](Self::dispatch) calls every listener synchronously on the
/// caller's thread. A listener that panics is logged and skipped; the
/// remaining listeners still run. The list is copied before dispatch so a
/// listener may register or unregister others without deadlocking.
pub struct ListenerRegistry<T> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> ListenerRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Appends a listener.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Delivers `event` to every listener in registration order and returns
    /// how many completed without panicking.
    pub fn dispatch(&self, event: &T) -> usize {
        let snapshot: Vec<_> = self.listeners.read().clone();
        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::warn!(subscription = %id, reason = %reason, "Listener panicked");
                }
            }
        }
        delivered
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish_non_exhaustive()
    }
}
