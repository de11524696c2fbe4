// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controllers: drive a device from another client.
//!
//! A [`Controller<M>`] is the remote half of the command/ack channel. It
//! publishes control messages carrying a correlation id on the device's
//! control topics and follows the device's state topic. The device applies
//! each command and answers with a snapshot carrying the same id, which
//! acknowledges the pending command.
//!
//! A controller holds no authoritative state. [`current_state`](Controller::current_state)
//! is the last snapshot the device published, and it is `None` until the
//! first one arrives.
//!
//! # Examples
//!
//! ```
//! use homesync_lib::config::{AckMode, CommandPolicy, DeviceOptions};
//! use homesync_lib::controller::BulbController;
//! use homesync_lib::device::Bulb;
//! use homesync_lib::protocol::MemoryBroker;
//! use homesync_lib::types::PowerState;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> homesync_lib::Result<()> {
//! let broker = MemoryBroker::new();
//! let bulb = Bulb::new("porch", broker.connector(), DeviceOptions::default());
//! bulb.connect().await?;
//!
//! let options = DeviceOptions::default()
//!     .with_command_policy(CommandPolicy::default().with_ack(AckMode::AwaitAck));
//! let remote = BulbController::new("porch", broker.connector(), options);
//! remote.connect().await?;
//!
//! remote.turn_on().await?;
//! assert_eq!(bulb.current_state().state.power, PowerState::On);
//!
//! remote.disconnect().await;
//! bulb.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod handle;
mod kinds;

pub use handle::Controller;
pub use kinds::{BulbController, LockController, SensorController};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::command::ControlCommand;
    use crate::config::{AckMode, CommandPolicy, ConnectionParams, DeviceOptions};
    use crate::device::{Bulb, Lock};
    use crate::error::{DeviceError, Error, ProtocolError, ValueError};
    use crate::protocol::{
        Connection, Connector, EventFuture, EventStream, MemoryBroker, Transport, TransportEvent,
    };
    use crate::types::PowerState;

    fn options() -> DeviceOptions {
        DeviceOptions::new(ConnectionParams::new("memory").with_port(1883))
    }

    fn awaiting() -> DeviceOptions {
        options().with_command_policy(CommandPolicy::default().with_ack(AckMode::AwaitAck))
    }

    /// Accepts the session and every publish, and never delivers anything.
    #[derive(Debug)]
    struct BlackHole;

    #[derive(Debug)]
    struct BlackHoleTransport;

    struct BlackHoleEvents {
        greeted: bool,
    }

    impl Transport for BlackHoleTransport {
        fn publish(&self, _: &str, _: Vec<u8>, _: bool) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn subscribe(&self, _: &str) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn disconnect(&self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    impl EventStream for BlackHoleEvents {
        fn next_event(&mut self) -> EventFuture<'_> {
            Box::pin(async move {
                if self.greeted {
                    std::future::pending().await
                } else {
                    self.greeted = true;
                    Ok(TransportEvent::Connected)
                }
            })
        }
    }

    impl Connector for BlackHole {
        fn open(&self, _: &str, _: &ConnectionParams) -> Result<Connection, ProtocolError> {
            Ok(Connection {
                transport: Arc::new(BlackHoleTransport),
                events: Box::new(BlackHoleEvents { greeted: false }),
            })
        }
    }

    fn state_message(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[tokio::test]
    async fn send_command_requires_connection() {
        let remote = BulbController::new("bulb_1", MemoryBroker::new().connector(), options());
        let err = remote.set_color("red").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(remote.pending_commands().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_brightness_is_not_sent() {
        let broker = MemoryBroker::new();
        let remote = BulbController::new("bulb_1", broker.connector(), options());
        remote.connect().await.unwrap();

        let err = remote.set_brightness(101).await.unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::OutOfRange { actual: 101, .. })));
        assert!(broker.published_matching("home/lights/bulb_1/control/+").is_empty());
        remote.disconnect().await;
    }

    #[tokio::test]
    async fn unsupported_command_is_rejected_before_publishing() {
        let broker = MemoryBroker::new();
        let remote = SensorController::new("s1", broker.connector(), options());
        remote.connect().await.unwrap();

        let err = remote.send_command(&ControlCommand::SetLock(true)).await.unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::UnsupportedOperation { .. })));
        assert!(broker.published_matching("home/sensors/s1/control/+").is_empty());
        remote.disconnect().await;
    }

    #[tokio::test]
    async fn command_is_acknowledged_by_the_device() {
        let broker = MemoryBroker::new();
        let bulb = Bulb::new("bulb_1", broker.connector(), options());
        bulb.connect().await.unwrap();
        let remote = BulbController::new("bulb_1", broker.connector(), awaiting());
        remote.connect().await.unwrap();

        let correlation_id = remote.turn_on().await.unwrap();
        assert!(correlation_id.starts_with("cmd_"));
        assert!(remote.pending_commands().is_empty());
        assert_eq!(bulb.current_state().state.power, PowerState::On);
        assert_eq!(remote.current_state().unwrap().state.power, PowerState::On);

        let control = broker.published_matching("home/lights/bulb_1/control/set_state");
        assert_eq!(control.len(), 1);
        assert_eq!(control[0].json().unwrap()["correlation_id"], json!(correlation_id));
        assert!(!control[0].retain);

        let state = broker.retained("home/lights/bulb_1/state").unwrap();
        let state: serde_json::Value = serde_json::from_slice(&state).unwrap();
        assert_eq!(state["correlation_id"], json!(correlation_id));
        assert_eq!(state["power"], json!("on"));

        remote.disconnect().await;
        bulb.disconnect().await;
    }

    #[tokio::test]
    async fn attaching_to_a_live_device_leaves_it_untouched() {
        let broker = MemoryBroker::new();
        let bulb = Bulb::new("lamp", broker.connector(), options());
        bulb.connect().await.unwrap();
        bulb.set_power(PowerState::On);
        let before = bulb.set_brightness(70);
        let retained_before = broker.retained("home/lights/lamp/state").unwrap();

        let remote = BulbController::new("lamp", broker.connector(), options());
        remote.connect().await.unwrap();
        let mut watch = remote.watch();
        let primed = tokio::time::timeout(Duration::from_secs(5), watch.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap()
            .clone();

        assert_eq!(primed, Some(before.clone()));
        assert_eq!(
            broker.subscriptions(remote.client_id()).unwrap().into_iter().collect::<Vec<_>>(),
            vec!["home/lights/lamp/state".to_string()]
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bulb.current_state(), before);
        assert_eq!(broker.retained("home/lights/lamp/state").unwrap(), retained_before);

        remote.disconnect().await;
        bulb.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_command_times_out() {
        let remote = BulbController::new("bulb_1", Arc::new(BlackHole), awaiting());
        remote.connect().await.unwrap();

        let err = remote.set_brightness(10).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!err.is_validation());
        assert!(remote.pending_commands().is_empty());
        remote.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fire_and_forget_leaves_entry_pending() {
        let remote = BulbController::new("bulb_1", Arc::new(BlackHole), options());
        remote.connect().await.unwrap();
        let id = remote.turn_off().await.unwrap();
        assert!(remote.pending_commands().get(&id).is_some());
        remote.disconnect().await;
    }

    #[tokio::test]
    async fn get_state_round_trips_through_broker() {
        let broker = MemoryBroker::new();
        let lock = Lock::new("door", broker.connector(), options());
        lock.connect().await.unwrap();
        lock.set_lock(false);

        let remote = LockController::new("door", broker.connector(), options());
        remote.connect().await.unwrap();
        let snapshot = remote.get_state().await.unwrap();
        assert!(!snapshot.state.locked);
        assert_eq!(snapshot, lock.current_state());
        assert!(remote.pending_commands().is_empty());

        remote.disconnect().await;
        lock.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn get_state_is_bounded() {
        let remote = LockController::new("door", Arc::new(BlackHole), options());
        remote.connect().await.unwrap();
        let started = tokio::time::Instant::now();
        let err = remote.get_state().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(remote.pending_commands().is_empty());
        remote.disconnect().await;
    }

    #[test]
    fn older_state_does_not_replace_newer() {
        let remote = BulbController::new("bulb_1", MemoryBroker::new().connector(), options());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        remote.subscribe_state(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let now = Utc::now().timestamp();
        let topic = remote.topics().state();
        remote.handle_message(&topic, &state_message(&json!({"brightness": 80, "timestamp": now})));
        remote.handle_message(&topic, &state_message(&json!({"brightness": 20, "timestamp": now - 5})));
        remote.handle_message(&topic, &state_message(&json!({"brightness": 80, "timestamp": now})));

        assert_eq!(remote.current_state().unwrap().state.brightness.value(), 80);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn control_topics_are_not_followed() {
        let remote = BulbController::new("bulb_1", MemoryBroker::new().connector(), options());
        remote.handle_message("home/lights/bulb_1/control/set_color", br#"{"color": "red"}"#);
        remote.handle_message(&remote.topics().state(), b"{oops");
        assert!(remote.current_state().is_none());
    }
}
