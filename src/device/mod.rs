// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Devices: canonical state, mutation, and the command/ack channel.
//!
//! A [`DeviceHandle<M>`] owns the state of one device of model `M`, a
//! [`Session`](crate::protocol::Session) to the broker and its listeners.
//! [`Bulb`], [`Lock`] and [`Sensor`] name the three instantiations, and
//! [`Device`] is the closed sum over them.
//!
//! [`update_state`](DeviceHandle::update_state) and
//! [`execute`](DeviceHandle::execute) mutate the local state, notify
//! listeners, and publish the new retained snapshot. Control messages
//! arriving on the device's control topics take the same path and are
//! answered with a snapshot carrying their correlation id. To drive a device
//! from elsewhere, use a [`Controller`](crate::controller::Controller).
//!
//! # Examples
//!
//! ```
//! use homesync_lib::device::Bulb;
//! use homesync_lib::protocol::MemoryBroker;
//! use homesync_lib::types::PowerState;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> homesync_lib::Result<()> {
//! let broker = MemoryBroker::new();
//! let bulb = Bulb::new("kitchen", broker.connector(), Default::default());
//! bulb.connect().await?;
//!
//! bulb.set_power(PowerState::On);
//! let snapshot = bulb.set_brightness(140);
//! assert_eq!(snapshot.state.brightness.value(), 100);
//! assert!(broker.retained("home/lights/kitchen/state").is_some());
//!
//! bulb.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod any;
mod handle;
mod inbound;
mod kinds;

pub use any::Device;
pub use handle::DeviceHandle;
pub use kinds::{Bulb, Lock, Sensor};

pub(crate) use handle::client_id;
pub(crate) use inbound::{correlation_id, decode_payload};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::command::ControlCommand;
    use crate::config::{ConnectionParams, DeviceOptions};
    use crate::error::{DeviceError, Error, ValueError};
    use crate::protocol::MemoryBroker;
    use crate::state::BulbUpdate;
    use crate::subscription::Subscribable;
    use crate::types::PowerState;

    fn options() -> DeviceOptions {
        DeviceOptions::new(ConnectionParams::new("memory").with_port(1883))
    }

    fn offline_bulb() -> Bulb {
        Bulb::new("bulb_1", MemoryBroker::new().connector(), options())
    }

    fn state_payload(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn brightness_is_clamped_on_every_write() {
        let bulb = offline_bulb();
        for b in -250..=350 {
            let snapshot = bulb.set_brightness(b);
            assert_eq!(i64::from(snapshot.state.brightness.value()), b.clamp(0, 100));
        }
    }

    #[test]
    fn default_state() {
        let bulb = offline_bulb();
        let snapshot = bulb.current_state();
        assert_eq!(snapshot.device_id, "bulb_1");
        assert_eq!(snapshot.state.power, PowerState::Off);
        assert_eq!(snapshot.state.brightness.value(), 0);
        assert_eq!(snapshot.state.color, "white");
        assert_eq!(bulb.revision(), 0);
    }

    #[test]
    fn invalid_update_leaves_state_unchanged() {
        let bulb = offline_bulb();
        bulb.set_color("red");
        let before = bulb.current_state();

        let patch = json!({"power": "maybe", "color": "green"});
        let err = bulb.update_from_json(patch.as_object().unwrap()).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(bulb.current_state(), before);
        assert_eq!(bulb.revision(), 1);
    }

    #[test]
    fn every_mutation_advances_revision_and_stamp() {
        let bulb = offline_bulb();
        let mut last = bulb.current_state().last_updated;
        for level in 0..50 {
            let snapshot = bulb.set_brightness(level);
            assert!(snapshot.last_updated > last);
            last = snapshot.last_updated;
        }
        assert_eq!(bulb.revision(), 50);

        bulb.update_state(&BulbUpdate::new());
        assert_eq!(bulb.revision(), 50);
    }

    #[test]
    fn lock_accepts_only_booleans() {
        let lock = Lock::new("door", MemoryBroker::new().connector(), options());
        assert!(!lock.set_lock_value(&json!(false)).unwrap().state.locked);
        assert!(lock.set_lock_value(&json!(true)).unwrap().state.locked);

        for bad in [json!(1), json!("false"), json!(null), json!({"locked": false})] {
            let err = lock.set_lock_value(&bad).unwrap_err();
            assert!(matches!(err, Error::Value(ValueError::InvalidLockValue(_))));
            assert!(lock.current_state().state.locked);
        }
    }

    #[test]
    fn sensor_rejects_control() {
        let sensor = Sensor::new("s1", MemoryBroker::new().connector(), options());
        let before = sensor.update_readings(19.5, 40.0, 120);

        let err = sensor.execute(&ControlCommand::SetBrightness(50)).unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::UnsupportedOperation { .. })
        ));
        assert_eq!(sensor.current_state(), before);
        assert_eq!(sensor.execute(&ControlCommand::GetState).unwrap(), before);
    }

    #[test]
    fn snapshots_are_atomic() {
        let bulb = offline_bulb();
        let writers: Vec<_> = [(PowerState::On, 100, "red"), (PowerState::Off, 0, "blue")]
            .into_iter()
            .map(|(power, level, color)| {
                let bulb = bulb.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        bulb.update_state(&BulbUpdate::new().power(power).brightness(level).color(color));
                    }
                })
            })
            .collect();

        let reader = {
            let bulb = bulb.clone();
            std::thread::spawn(move || {
                for _ in 0..5_000 {
                    let s = bulb.current_state().state;
                    let consistent = matches!(
                        (s.power, s.brightness.value(), s.color.as_str()),
                        (PowerState::Off, 0, "white" | "blue") | (PowerState::On, 100, "red")
                    );
                    assert!(consistent, "torn snapshot: {s:?}");
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn listeners_run_in_order_and_survive_panics() {
        let bulb = offline_bulb();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        bulb.on_state_changed(move |s| o.lock().push(("first", s.state.brightness.value())));
        bulb.on_state_changed(|_| panic!("listener failure"));
        let o = Arc::clone(&order);
        bulb.on_state_changed(move |s| o.lock().push(("third", s.state.brightness.value())));

        bulb.set_brightness(30);
        assert_eq!(*order.lock(), vec![("first", 30), ("third", 30)]);
    }

    #[test]
    fn listener_may_mutate_its_own_device() {
        let bulb = offline_bulb();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let inner = bulb.clone();
        let log = Arc::clone(&seen);
        bulb.on_state_changed(move |s| {
            log.lock().push(s.state.color.clone());
            if s.state.color == "red" {
                inner.set_color("green");
            }
        });

        bulb.set_color("red");
        assert_eq!(bulb.current_state().state.color, "green");
        assert_eq!(*seen.lock(), vec!["red", "green"]);
    }

    #[test]
    fn listeners_never_go_backwards_under_contention() {
        let bulb = offline_bulb();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bulb.on_state_changed(move |s| {
            std::thread::sleep(Duration::from_micros(50));
            log.lock().push(s.last_updated);
        });

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let bulb = bulb.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        bulb.set_brightness(t * 100 + i);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let seen = seen.lock();
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "listener saw an older snapshot");
        assert_eq!(seen.last(), Some(&bulb.current_state().last_updated));
    }

    #[test]
    fn inbound_control_is_validated_and_applied() {
        let bulb = offline_bulb();
        let base = bulb.topics().base().to_string();

        bulb.handle_message(&format!("{base}/control/set_brightness"), br#"{"brightness": 150}"#);
        assert_eq!(bulb.current_state().state.brightness.value(), 100);

        bulb.handle_message(&format!("{base}/control/set_state"), br#"{"state": "on"}"#);
        assert_eq!(bulb.current_state().state.power, PowerState::On);

        let before = bulb.current_state();
        bulb.handle_message(&format!("{base}/control/set_state"), br#"{"power": "dim"}"#);
        bulb.handle_message(&format!("{base}/control/explode"), b"{}");
        bulb.handle_message(&format!("{base}/control/set_color"), b"{not json");
        bulb.handle_message(&format!("{base}/control/set_lock"), br#"{"locked": true}"#);
        bulb.handle_message("home/lights/other/control/set_color", br#"{"color": "red"}"#);
        assert_eq!(bulb.current_state(), before);
    }

    #[test]
    fn own_snapshot_round_trips() {
        let bulb = offline_bulb();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        bulb.on_state_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let published = bulb.set_color("teal");
        bulb.handle_message(&bulb.topics().state(), &state_payload(&published.to_json()));

        assert_eq!(bulb.current_state(), published);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn older_state_message_is_ignored() {
        let bulb = offline_bulb();
        let first = bulb.set_brightness(10);
        bulb.set_brightness(80);
        let current = bulb.current_state();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        bulb.on_state_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bulb.handle_message(&bulb.topics().state(), &state_payload(&first.to_json()));
        let ancient = json!({"brightness": 5, "color": "red", "timestamp": 1_714_557_600});
        bulb.handle_message(&bulb.topics().state(), &state_payload(&ancient));

        assert_eq!(bulb.current_state(), current);
        assert_eq!(bulb.revision(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn newer_remote_state_merges_present_fields() {
        let bulb = offline_bulb();
        bulb.set_color("red");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        bulb.on_state_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let at = Utc::now().timestamp() + 60;
        let payload = json!({"brightness": 64, "timestamp": at});
        bulb.handle_message(&bulb.topics().state(), &state_payload(&payload));

        let snapshot = bulb.current_state();
        assert_eq!(snapshot.state.brightness.value(), 64);
        assert_eq!(snapshot.state.color, "red");
        assert_eq!(snapshot.last_updated.timestamp(), at);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sensor_state_accepts_light_alias() {
        let sensor = Sensor::new("s1", MemoryBroker::new().connector(), options());
        sensor.handle_message(&sensor.topics().state(), br#"{"temperature": 18.0, "light": 42}"#);
        let state = sensor.current_state().state;
        assert_eq!(state.light_level, 42);
        assert!((state.humidity - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn own_echoes_do_not_replay_older_states() {
        let broker = MemoryBroker::new();
        let bulb = Bulb::new("bulb_1", broker.connector(), options());
        bulb.connect().await.unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bulb.on_state_changed(move |s| log.lock().push((s.state.power, s.state.brightness.value())));

        bulb.set_power(PowerState::On);
        bulb.set_brightness(80);

        // Replay every snapshot the broker saw, then let the real echoes land
        for message in broker.published_matching("home/lights/bulb_1/state") {
            bulb.handle_message(&message.topic, &message.payload);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*seen.lock(), vec![(PowerState::On, 0), (PowerState::On, 80)]);
        assert_eq!(bulb.current_state().state.brightness.value(), 80);
        assert_eq!(bulb.revision(), 2);
        bulb.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_settle_on_the_last_mutation() {
        let broker = MemoryBroker::new();
        let bulb = Bulb::new("bulb_1", broker.connector(), options());
        bulb.connect().await.unwrap();
        bulb.on_state_changed(|_| std::thread::sleep(Duration::from_micros(200)));

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let bulb = bulb.clone();
                tokio::task::spawn_blocking(move || {
                    for i in 0..25 {
                        bulb.set_brightness(t * 25 + i);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let current = bulb.current_state();
        assert_eq!(bulb.revision(), 100);
        let retained = broker.retained("home/lights/bulb_1/state").unwrap();
        let retained: serde_json::Value = serde_json::from_slice(&retained).unwrap();
        assert_eq!(retained, current.to_json());
        bulb.disconnect().await;
    }
}
