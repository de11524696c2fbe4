// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A registry of simulated devices on an in-process broker, driven by a
//! remote controller that waits for acknowledgements.
//!
//! Run with `RUST_LOG=debug cargo run --example loopback` for protocol logs.

use std::time::Duration;

use homesync_lib::config::{AckMode, CommandPolicy, ConnectionParams, DeviceOptions, RegistryConfig};
use homesync_lib::controller::{BulbController, LockController};
use homesync_lib::event::DeviceEvent;
use homesync_lib::protocol::MemoryBroker;
use homesync_lib::registry::DeviceRegistry;
use homesync_lib::state::Payload;
use homesync_lib::types::DeviceKind;
use serde_json::{Value, json};

fn body(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[tokio::main]
async fn main() -> homesync_lib::Result<()> {
    tracing_subscriber::fmt::init();

    let broker = MemoryBroker::new();
    let registry = DeviceRegistry::new(broker.connector(), RegistryConfig::default());

    let mut events = registry.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                DeviceEvent::StateChanged { snapshot } => {
                    println!("state   {}", snapshot.to_json());
                }
                other => println!("event   {other:?}"),
            }
        }
    });

    let params = ConnectionParams::new("memory").with_port(1883);
    registry
        .create_device(DeviceKind::Light, "living_room", params.clone())
        .await?;
    registry
        .create_device(DeviceKind::Lock, "front_door", params.clone())
        .await?;
    let sensor = registry
        .create_device(DeviceKind::Sensor, "hallway", params.clone())
        .await?;

    // Local control through the registry
    let reply = registry
        .dispatch("living_room", "set_brightness", &body(json!({"brightness": 80})))
        .await;
    println!("reply   {}", serde_json::to_value(&reply).unwrap_or_default());

    let reply = registry
        .dispatch("hallway", "set_color", &body(json!({"color": "red"})))
        .await;
    println!("reply   {}", serde_json::to_value(&reply).unwrap_or_default());

    if let Some(sensor) = sensor.as_sensor() {
        sensor.update_readings(21.5, 44.0, 320);
    }

    // Remote control over the broker, waiting for each acknowledgement
    let options = DeviceOptions::new(params)
        .with_command_policy(CommandPolicy::default().with_ack(AckMode::AwaitAck));
    let lamp = BulbController::new("living_room", broker.connector(), options.clone());
    let door = LockController::new("front_door", broker.connector(), options);
    lamp.connect().await?;
    door.connect().await?;

    lamp.subscribe_state(|snapshot| println!("lamp    {}", snapshot.to_json()));

    let id = lamp.turn_on().await?;
    println!("acked   {id}");
    let id = lamp.set_color("amber").await?;
    println!("acked   {id}");
    let id = door.unlock().await?;
    println!("acked   {id}");

    let state = door.get_state().await?;
    println!("door    locked={}", state.state.locked);

    for info in registry.list_devices(None).await {
        println!("device  {} ({}): {}", info.device_id, info.kind, info.state.to_json());
    }

    lamp.disconnect().await;
    door.disconnect().await;
    registry.shutdown().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}
