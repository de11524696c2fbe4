// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory table of commands awaiting acknowledgement.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A published command that has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Identifier attached to the outbound payload.
    pub correlation_id: String,
    /// Name of the command.
    pub command_name: String,
    /// When the command was published.
    pub issued_at: Instant,
}

#[derive(Debug)]
struct Entry {
    command: PendingCommand,
    waiter: Option<oneshot::Sender<()>>,
}

/// Pending commands keyed by correlation id.
///
/// Entries leave the table when acknowledged, when their waiter gives up, or
/// when a later insertion finds them older than the time-to-live.
#[derive(Debug)]
pub struct PendingCommands {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl PendingCommands {
    /// Creates an empty table whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Records a command. With `wait` set, returns a receiver that resolves
    /// when the command is acknowledged.
    pub fn insert(
        &self,
        correlation_id: &str,
        command_name: &str,
        wait: bool,
    ) -> Option<oneshot::Receiver<()>> {
        let now = Instant::now();
        let (tx, rx) = if wait {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, e| now.duration_since(e.command.issued_at) < ttl);
        entries.insert(
            correlation_id.to_string(),
            Entry {
                command: PendingCommand {
                    correlation_id: correlation_id.to_string(),
                    command_name: command_name.to_string(),
                    issued_at: now,
                },
                waiter: tx,
            },
        );
        rx
    }

    /// Removes the entry and wakes its waiter. Returns `false` if the id is
    /// not pending.
    pub fn acknowledge(&self, correlation_id: &str) -> bool {
        let Some(entry) = self.entries.lock().remove(correlation_id) else {
            return false;
        };
        if let Some(waiter) = entry.waiter {
            let _ = waiter.send(());
        }
        true
    }

    /// Removes the entry without waking anyone.
    pub fn remove(&self, correlation_id: &str) -> Option<PendingCommand> {
        self.entries.lock().remove(correlation_id).map(|e| e.command)
    }

    /// Drops every entry older than the time-to-live and returns how many
    /// were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.command.issued_at) < ttl);
        before - entries.len()
    }

    /// Returns a copy of the entry, if pending.
    #[must_use]
    pub fn get(&self, correlation_id: &str) -> Option<PendingCommand> {
        self.entries
            .lock()
            .get(correlation_id)
            .map(|e| e.command.clone())
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_removes_entry() {
        let table = PendingCommands::new(Duration::from_secs(5));
        table.insert("cmd_1", "set_state", false);
        assert_eq!(table.get("cmd_1").unwrap().command_name, "set_state");
        assert!(table.acknowledge("cmd_1"));
        assert!(!table.acknowledge("cmd_1"));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_wakes_waiter() {
        let table = PendingCommands::new(Duration::from_secs(5));
        let rx = table.insert("cmd_2", "set_lock", true).unwrap();
        table.acknowledge("cmd_2");
        assert!(rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept() {
        let table = PendingCommands::new(Duration::from_secs(5));
        table.insert("old", "set_color", false);
        tokio::time::advance(Duration::from_secs(6)).await;
        table.insert("new", "set_color", false);
        assert!(table.get("old").is_none());
        assert_eq!(table.len(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(table.sweep_expired(), 1);
    }
}
