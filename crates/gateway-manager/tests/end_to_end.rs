// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end manager dispatch scenarios, driven directly against the
//! bus rather than through `gateway-modbus`/`gateway-ekuiper`, so the
//! dispatch loop (C5) is exercised independent of any transport.

use gateway_core::bus::Bus;
use gateway_core::message::{Envelope, MessageType, TagSample, TransData};
use gateway_core::plugin::{Plugin, PluginDescriptor, PluginKind, PluginRegistry, PluginType, PluginVersion};
use gateway_manager::Manager;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct NoopPlugin;

impl Plugin for NoopPlugin {
    fn open(&mut self) -> Result<(), gateway_core::error::GatewayError> {
        Ok(())
    }
    fn close(&mut self) {}
    fn init(&mut self, _setting: &serde_json::Value) -> Result<(), gateway_core::error::GatewayError> {
        Ok(())
    }
    fn uninit(&mut self) {}
    fn start(&mut self) -> Result<(), gateway_core::error::GatewayError> {
        Ok(())
    }
    fn stop(&mut self) {}
    fn setting(&mut self, _setting: &serde_json::Value) -> Result<(), gateway_core::error::GatewayError> {
        Ok(())
    }
    fn request(&mut self, _op: &str, _body: serde_json::Value) -> Result<serde_json::Value, gateway_core::error::GatewayError> {
        Ok(serde_json::Value::Null)
    }
}

fn noop_factory() -> Box<dyn Plugin> {
    Box::new(NoopPlugin)
}

const VERSION: PluginVersion = PluginVersion { major: 1, minor: 0, patch: 0 };

fn test_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new(VERSION);
    registry
        .add(PluginDescriptor::new("modbus-tcp", "modbus-tcp.schema", PluginKind::System, PluginType::Driver, VERSION, noop_factory))
        .unwrap();
    registry
        .add(PluginDescriptor::new("ekuiper", "ekuiper.schema", PluginKind::System, PluginType::App, VERSION, noop_factory))
        .unwrap();
    registry
}

async fn recv(endpoint: &mut gateway_core::bus::Endpoint) -> Envelope {
    timeout(Duration::from_secs(1), endpoint.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("endpoint closed")
        .1
}

/// Scenario 1: subscribe then receive. `a1` subscribes to `d1`'s group
/// `g1`; once `d1` publishes `TRANS_DATA` for that group, `a1` gets the
/// fan-out copy.
#[tokio::test]
async fn subscribe_then_receive_fans_out_trans_data() {
    let bus = Arc::new(Bus::new());
    let mut manager = Manager::new(bus.clone(), test_registry());
    tokio::spawn(async move { manager.run().await });

    let mut d1 = bus.register("d1");
    let mut a1 = bus.register("a1");

    bus.try_send("d1", "manager", Envelope::new("d1", "manager", MessageType::ADD_NODE { name: "d1".into(), module_name: "modbus-tcp".into(), setting: None })).unwrap();
    assert!(matches!(recv(&mut d1).await.body, MessageType::RESP_ERROR { .. }));

    bus.try_send("a1", "manager", Envelope::new("a1", "manager", MessageType::ADD_NODE { name: "a1".into(), module_name: "ekuiper".into(), setting: None })).unwrap();
    assert!(matches!(recv(&mut a1).await.body, MessageType::RESP_ERROR { .. }));

    bus.try_send("d1", "manager", Envelope::new("d1", "manager", MessageType::ADD_GROUP { group: "g1".into(), interval_ms: 1000 })).unwrap();
    assert!(matches!(recv(&mut d1).await.body, MessageType::RESP_UPDATE_DRIVER_GROUP { ok: true }));

    bus.try_send(
        "a1",
        "manager",
        Envelope::new("a1", "manager", MessageType::SUBSCRIBE_GROUP { driver: "d1".into(), group: "g1".into(), params: None, static_tags: None, app_addr: "a1".into() }),
    )
    .unwrap();
    // d1 gets notified of the new subscriber, a1 gets the ack.
    assert!(matches!(recv(&mut d1).await.body, MessageType::SUBSCRIBE_GROUP { .. }));
    assert!(matches!(recv(&mut a1).await.body, MessageType::RESP_ERROR { error: gateway_core::error::ErrorKind::Success }));

    let data = TransData {
        driver: "d1".into(),
        group: "g1".into(),
        timestamp_ms: 0,
        samples: vec![TagSample { tag: "t1".into(), value: Some(gateway_core::message::TagValue::UInt(7)), error: None, metas: Default::default() }],
    };
    bus.try_send("d1", "manager", Envelope::new("d1", "manager", MessageType::TRANS_DATA(data))).unwrap();

    let fanned = recv(&mut a1).await;
    match fanned.body {
        MessageType::TRANS_DATA(data) => {
            assert_eq!(data.driver, "d1");
            assert_eq!(data.group, "g1");
            assert_eq!(data.samples.len(), 1);
        }
        other => panic!("expected TRANS_DATA, got {other:?}"),
    }
}

/// Scenario 6: deleting a driver notifies every subscribed app with
/// `NODE_DELETED` and removes both subscriptions from the index.
#[tokio::test]
async fn delete_node_cascades_to_subscribed_apps() {
    let bus = Arc::new(Bus::new());
    let mut manager = Manager::new(bus.clone(), test_registry());
    tokio::spawn(async move { manager.run().await });

    let mut d1 = bus.register("d1");
    let mut a1 = bus.register("a1");
    let mut a2 = bus.register("a2");

    for (name, module) in [("d1", "modbus-tcp"), ("a1", "ekuiper"), ("a2", "ekuiper")] {
        bus.try_send(name, "manager", Envelope::new(name, "manager", MessageType::ADD_NODE { name: name.into(), module_name: module.into(), setting: None })).unwrap();
    }
    let _ = recv(&mut d1).await;
    let _ = recv(&mut a1).await;
    let _ = recv(&mut a2).await;

    bus.try_send("d1", "manager", Envelope::new("d1", "manager", MessageType::ADD_GROUP { group: "g1".into(), interval_ms: 1000 })).unwrap();
    let _ = recv(&mut d1).await;

    for app in ["a1", "a2"] {
        bus.try_send(
            app,
            "manager",
            Envelope::new(app, "manager", MessageType::SUBSCRIBE_GROUP { driver: "d1".into(), group: "g1".into(), params: None, static_tags: None, app_addr: app.into() }),
        )
        .unwrap();
        let _ = recv(&mut d1).await; // driver-side subscribe notify
    }
    let _ = recv(&mut a1).await; // subscribe ack
    let _ = recv(&mut a2).await;

    bus.try_send("d1", "manager", Envelope::new("d1", "manager", MessageType::DEL_NODE { name: "d1".into() })).unwrap();

    assert!(matches!(recv(&mut a1).await.body, MessageType::NODE_DELETED { node } if node == "d1"));
    assert!(matches!(recv(&mut a2).await.body, MessageType::NODE_DELETED { node } if node == "d1"));

    // The manager must not delete the node outright: it asks d1 to
    // uninit first and only finishes the deletion once d1 confirms.
    assert!(matches!(recv(&mut d1).await.body, MessageType::NODE_UNINIT));
    assert!(bus.is_registered("d1"));

    // d1 drains and tears itself down the way a real node runtime does,
    // then reports back.
    bus.deregister("d1");
    bus.try_send("d1", "manager", Envelope::new("d1", "manager", MessageType::RESP_NODE_UNINIT)).unwrap();

    let resp = recv(&mut d1).await;
    assert!(matches!(resp.body, MessageType::RESP_ERROR { error: gateway_core::error::ErrorKind::Success }));
    assert!(!bus.is_registered("d1"));
}
