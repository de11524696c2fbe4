// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the registry over the in-memory broker.

use std::time::Duration;

use homesync_lib::command::ControlCommand;
use homesync_lib::config::{AckMode, CommandPolicy, ConnectionParams, DeviceOptions, RegistryConfig};
use homesync_lib::controller::BulbController;
use homesync_lib::device::Device;
use homesync_lib::error::{DeviceError, Error};
use homesync_lib::event::DeviceEvent;
use homesync_lib::protocol::{ConnectionState, MemoryBroker};
use homesync_lib::registry::DeviceRegistry;
use homesync_lib::types::{DeviceKind, PowerState};
use serde_json::json;
use tokio::sync::broadcast;

fn setup() -> (MemoryBroker, DeviceRegistry) {
    let broker = MemoryBroker::new();
    let registry = DeviceRegistry::new(broker.connector(), RegistryConfig::default());
    (broker, registry)
}

fn params() -> ConnectionParams {
    ConnectionParams::new("localhost").with_port(1883)
}

/// Waits for the next event matching `pred`, skipping others.
async fn next_matching(
    events: &mut broadcast::Receiver<DeviceEvent>,
    pred: impl Fn(&DeviceEvent) -> bool,
) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = events.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("no matching event")
}

/// Publishes a `get_state` on behalf of an outside client and waits until
/// the device has answered it. Everything the broker queued for the device
/// before this call has been handled once it returns.
async fn settle(broker: &MemoryBroker, base: &str, marker: &str) {
    broker.publish(
        &format!("{base}/control/get_state"),
        serde_json::to_vec(&json!({"correlation_id": marker})).unwrap(),
        false,
    );
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(state) = broker.retained(&format!("{base}/state")) {
                let state: serde_json::Value = serde_json::from_slice(&state).unwrap();
                if state["correlation_id"] == json!(marker) {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("device did not answer");
}

/// State events received so far, without waiting.
fn drain_state_events(events: &mut broadcast::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.is_state_change() {
            seen.push(event);
        }
    }
    seen
}

// ============================================================================
// Registry Operations
// ============================================================================

mod operations {
    use super::*;

    #[tokio::test]
    async fn new_light_lists_with_defaults() {
        let (_, registry) = setup();
        registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();

        let devices = registry.list_devices(None).await;
        assert_eq!(devices.len(), 1);

        let mut row = serde_json::to_value(&devices[0]).unwrap();
        row["state"]
            .as_object_mut()
            .unwrap()
            .remove("last_updated");
        assert_eq!(
            row,
            json!({
                "device_id": "bulb_1",
                "kind": "light",
                "state": {
                    "device_id": "bulb_1",
                    "power": "off",
                    "brightness": 0,
                    "color": "white"
                }
            })
        );
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn deleting_unknown_device_changes_nothing() {
        let (_, registry) = setup();
        registry
            .create_device(DeviceKind::Lock, "door", params())
            .await
            .unwrap();

        assert!(!registry.delete_device("garage").await);
        assert_eq!(registry.len().await, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn sensor_rejects_control_and_keeps_readings() {
        let (_, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Sensor, "sensor_1", params())
            .await
            .unwrap();
        let before = device.snapshot();

        let err = registry
            .control("sensor_1", &ControlCommand::SetBrightness(40))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::UnsupportedOperation {
                kind: DeviceKind::Sensor,
                ..
            })
        ));
        assert_eq!(device.snapshot(), before);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_creates_register_one_instance() {
        let (broker, registry) = setup();
        let (a, b) = tokio::join!(
            registry.create_device(DeviceKind::Light, "bulb_1", params()),
            registry.create_device(DeviceKind::Light, "bulb_1", params()),
        );

        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, Error::Device(DeviceError::AlreadyExists(_))));
        assert_eq!(registry.len().await, 1);
        assert_eq!(broker.session_count(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn recreated_device_supersedes_retained_state() {
        let (broker, registry) = setup();
        registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        registry
            .control("bulb_1", &ControlCommand::SetColor("amber".into()))
            .await
            .unwrap();
        assert!(registry.delete_device("bulb_1").await);
        assert_eq!(broker.session_count(), 0);

        let mut events = registry.subscribe();
        registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        assert_eq!(
            next_matching(&mut events, DeviceEvent::is_lifecycle).await,
            DeviceEvent::device_added("bulb_1", DeviceKind::Light)
        );

        // The new instance publishes its own default snapshot on connect
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let retained = broker.retained("home/lights/bulb_1/state").unwrap();
                let retained: serde_json::Value = serde_json::from_slice(&retained).unwrap();
                if retained["color"] == json!("white") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn retained_predecessor_is_not_adopted_on_create() {
        let (broker, registry) = setup();
        broker.publish(
            "home/lights/bulb_1/state",
            serde_json::to_vec(&json!({
                "device_id": "bulb_1",
                "power": "on",
                "brightness": 90,
                "color": "amber",
                "last_updated": "2024-05-01T10:00:00Z"
            }))
            .unwrap(),
            true,
        );

        let mut events = registry.subscribe();
        let device = registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        let defaults = registry.list_devices(None).await[0].state.clone();
        assert_eq!(defaults.to_json()["color"], json!("white"));

        settle(&broker, "home/lights/bulb_1", "cmd_settle").await;
        assert_eq!(device.snapshot(), defaults);
        assert!(drain_state_events(&mut events).is_empty());
        registry.shutdown().await;
    }
}

// ============================================================================
// Control and Events
// ============================================================================

mod control {
    use super::*;

    #[tokio::test]
    async fn control_publishes_retained_state_and_event() {
        let (broker, registry) = setup();
        registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        let mut events = registry.subscribe();

        registry
            .control("bulb_1", &ControlCommand::SetBrightness(180))
            .await
            .unwrap();

        let event = next_matching(&mut events, DeviceEvent::is_state_change).await;
        let DeviceEvent::StateChanged { snapshot } = event else {
            unreachable!()
        };
        assert_eq!(snapshot.to_json()["brightness"], json!(100));

        let retained = broker.retained("home/lights/bulb_1/state").unwrap();
        let retained: serde_json::Value = serde_json::from_slice(&retained).unwrap();
        assert_eq!(retained["brightness"], json!(100));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn inbound_control_from_another_client() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Lock, "door", params())
            .await
            .unwrap();
        let mut events = registry.subscribe();

        broker.publish(
            "home/locks/door/control/set_lock",
            br#"{"locked": false, "correlation_id": "cmd_remote"}"#.to_vec(),
            false,
        );

        let event = next_matching(&mut events, DeviceEvent::is_state_change).await;
        assert_eq!(event.device_id(), "door");
        assert!(!device.as_lock().unwrap().current_state().state.locked);

        let answer = broker.retained("home/locks/door/state").unwrap();
        let answer: serde_json::Value = serde_json::from_slice(&answer).unwrap();
        assert_eq!(answer["correlation_id"], json!("cmd_remote"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_messages_do_not_stop_the_session() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        let bulb = device.as_bulb().unwrap().clone();

        let garbage: [&[u8]; 4] = [b"{", b"[]", b"\"on\"", br#"{"brightness": "high"}"#];
        for garbage in garbage {
            broker.publish("home/lights/bulb_1/control/set_brightness", garbage.to_vec(), false);
        }
        broker.publish(
            "home/lights/bulb_1/control/set_brightness",
            br#"{"brightness": 55}"#.to_vec(),
            false,
        );

        let mut watch = bulb.watch();
        tokio::time::timeout(
            Duration::from_secs(5),
            watch.wait_for(|s| s.state.brightness.value() == 55),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(bulb.is_connected());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn stale_state_message_is_ignored() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        registry
            .control("bulb_1", &ControlCommand::SetColor("amber".into()))
            .await
            .unwrap();
        let before = device.snapshot();
        let mut events = registry.subscribe();

        broker.publish(
            "home/lights/bulb_1/state",
            br#"{"color": "red", "brightness": 10, "timestamp": 1714557600}"#.to_vec(),
            false,
        );
        settle(&broker, "home/lights/bulb_1", "cmd_after_stale").await;

        assert_eq!(device.snapshot(), before);
        assert!(drain_state_events(&mut events).is_empty());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn remote_controller_gets_acknowledged() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Light, "lamp", params())
            .await
            .unwrap();

        let policy = CommandPolicy::default().with_ack(AckMode::AwaitAck);
        let controller = BulbController::new(
            "lamp",
            broker.connector(),
            DeviceOptions::new(params()).with_command_policy(policy),
        );
        controller.connect().await.unwrap();

        controller.turn_on().await.unwrap();
        assert!(controller.pending_commands().is_empty());
        assert_eq!(
            device.as_bulb().unwrap().current_state().state.power,
            PowerState::On
        );

        controller.disconnect().await;
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn controller_attaching_to_live_device_keeps_its_state() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Light, "lamp", params())
            .await
            .unwrap();
        registry
            .control("lamp", &ControlCommand::SetPower(PowerState::On))
            .await
            .unwrap();
        let live = registry
            .control("lamp", &ControlCommand::SetBrightness(70))
            .await
            .unwrap();
        broker.clear_log();

        let policy = CommandPolicy::default().with_ack(AckMode::AwaitAck);
        let controller = BulbController::new(
            "lamp",
            broker.connector(),
            DeviceOptions::new(params()).with_command_policy(policy),
        );
        controller.connect().await.unwrap();
        let seen = controller.get_state().await.unwrap();

        assert_eq!(seen.to_json(), live.to_json());
        assert_eq!(device.snapshot(), live);
        // Only the device's answer to get_state went out on the state topic
        let states = broker.published_matching("home/lights/lamp/state");
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].json().unwrap()["brightness"], json!(70));
        assert_eq!(states[0].json().unwrap()["power"], json!("on"));

        controller.set_color("blue").await.unwrap();
        let bulb = device.as_bulb().unwrap().current_state();
        assert_eq!(
            (bulb.state.power, bulb.state.brightness.value(), bulb.state.color.as_str()),
            (PowerState::On, 70, "blue")
        );

        controller.disconnect().await;
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn snapshots_stay_consistent_under_concurrent_control() {
        let (_, registry) = setup();
        registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        let device: Device = registry.get_device("bulb_1").await.unwrap();
        let bulb = device.as_bulb().unwrap().clone();

        let writers: Vec<_> = [(PowerState::On, 100, "red"), (PowerState::Off, 0, "blue")]
            .into_iter()
            .map(|(power, level, color)| {
                let bulb = bulb.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        bulb.update_state(
                            &homesync_lib::state::BulbUpdate::new()
                                .power(power)
                                .brightness(level)
                                .color(color),
                        );
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            for info in registry.list_devices(Some(DeviceKind::Light)).await {
                let state = info.state.to_json();
                let triple = (
                    state["power"].as_str().unwrap().to_string(),
                    state["brightness"].as_i64().unwrap(),
                    state["color"].as_str().unwrap().to_string(),
                );
                let consistent = matches!(
                    (triple.0.as_str(), triple.1, triple.2.as_str()),
                    ("off", 0, "white" | "blue") | ("on", 100, "red")
                );
                assert!(consistent, "torn snapshot: {triple:?}");
            }
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap();
        }
        registry.shutdown().await;
    }
}

// ============================================================================
// Connection Loss
// ============================================================================

mod reconnection {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reconnect_resubscribes_same_topics_and_republishes() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Light, "bulb_1", params())
            .await
            .unwrap();
        let client_id = device.client_id().to_string();
        let before = broker.subscriptions(&client_id).unwrap();
        assert_eq!(before.len(), 2);
        let mut events = registry.subscribe();
        broker.clear_log();

        broker.drop_connections();

        assert_eq!(
            next_matching(&mut events, DeviceEvent::is_connection).await,
            DeviceEvent::disconnected("bulb_1")
        );
        assert_eq!(
            next_matching(&mut events, DeviceEvent::is_connection).await,
            DeviceEvent::connected("bulb_1")
        );

        assert_eq!(broker.subscriptions(&client_id).unwrap(), before);
        assert!(!broker.published_matching("home/lights/bulb_1/state").is_empty());
        assert_eq!(device.connection_state(), ConnectionState::Connected);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retries_and_reports() {
        let (broker, registry) = setup();
        let device = registry
            .create_device(DeviceKind::Sensor, "sensor_1", params())
            .await
            .unwrap();
        let mut events = registry.subscribe();

        broker.set_available(false);
        broker.drop_connections();

        let started = tokio::time::Instant::now();
        let event = next_matching(&mut events, |e| {
            matches!(e, DeviceEvent::ConnectionChanged { error: Some(_), .. })
        })
        .await;
        assert_eq!(event.device_id(), "sensor_1");
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(device.connection_state().is_failed());

        // Still registered; the caller decides what to do with it
        assert_eq!(registry.len().await, 1);
        registry.shutdown().await;
    }
}
