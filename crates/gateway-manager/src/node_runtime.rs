// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node runtime (C6).
//!
//! Generalizes the discovery server's `handle_connection()` read-
//! dispatch-reply loop from one TCP connection to one bus endpoint per
//! node. Each node runs its own task; the plugin's interface methods
//! are only ever called from that task, so they are never invoked
//! concurrently on the same instance (§4.6 invariant a).

use gateway_core::error::ErrorKind;
use gateway_core::message::{Envelope, MessageType, TagSample, TraceCtx, TransData};
use gateway_core::bus::Bus;
use gateway_core::plugin::Plugin;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NodeRuntime {
    name: String,
    bus: Arc<Bus>,
    plugin: Box<dyn Plugin>,
}

impl NodeRuntime {
    pub fn new(name: impl Into<String>, bus: Arc<Bus>, plugin: Box<dyn Plugin>) -> Self {
        Self { name: name.into(), bus, plugin }
    }

    /// Run until a `NODE_UNINIT` is received; draining and replying
    /// `RESP_NODE_UNINIT` before returning (§4.6 invariant b: release on
    /// every exit path).
    pub async fn run(mut self) {
        let mut endpoint = self.bus.register(&self.name);
        let _ = self.bus.try_send(&self.name, "manager", Envelope::new(&self.name, "manager", MessageType::NODE_INIT));

        if let Err(e) = self.plugin.open() {
            warn!(node = %self.name, error = %e, "plugin open failed");
            return;
        }

        loop {
            match endpoint.recv().await {
                None => break,
                Some((from, envelope)) => {
                    debug!(node = %self.name, %from, "node runtime received message");
                    if self.dispatch(envelope).await {
                        break;
                    }
                }
            }
        }

        self.plugin.stop();
        self.plugin.uninit();
        self.plugin.close();
        self.bus.deregister(&self.name);
        let _ = self.bus.try_send(&self.name, "manager", Envelope::new(&self.name, "manager", MessageType::RESP_NODE_UNINIT));
        info!(node = %self.name, "node runtime stopped");
    }

    /// Sends `body` back to the manager, addressed (via `receiver`, not
    /// the physical bus target) to whoever originated the forwarded
    /// request this is answering.
    fn reply_to_manager(&self, origin: &str, ctx: Option<u64>, trace: Option<TraceCtx>, body: MessageType) {
        let mut env = Envelope::new(&self.name, "manager", body);
        env.receiver = origin.to_string();
        env.ctx = ctx;
        env.trace = trace;
        if let Err(e) = self.bus.try_send(&self.name, "manager", env) {
            warn!(node = %self.name, error = %e, "failed to reply via manager");
        }
    }

    /// Returns true when the node should terminate its loop.
    async fn dispatch(&mut self, envelope: Envelope) -> bool {
        let origin = envelope.sender.clone();
        let ctx = envelope.ctx;
        let trace = envelope.trace.clone();

        match envelope.body {
            MessageType::NODE_UNINIT => return true,
            MessageType::NODE_SETTING { setting } => {
                if let Err(e) = self.plugin.setting(&setting) {
                    warn!(node = %self.name, error = %e, "setting apply failed");
                }
            }
            MessageType::NODE_CTL { start } => {
                let result = if start { self.plugin.start() } else { Ok(self.plugin.stop()) };
                if let Err(e) = result {
                    warn!(node = %self.name, error = %e, "ctl failed");
                }
            }

            MessageType::ADD_TAG { driver, group, tag_json } => {
                let body = serde_json::json!({ "driver": driver, "group": group, "tag": tag_json });
                let resp = match self.plugin.request("add_tag", body) {
                    Ok(_) => MessageType::RESP_ADD_TAG { ok: true },
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::UPDATE_TAG { driver, group, tag_json } => {
                let body = serde_json::json!({ "driver": driver, "group": group, "tag": tag_json });
                let resp = match self.plugin.request("update_tag", body) {
                    Ok(_) => MessageType::RESP_UPDATE_TAG { ok: true },
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::DEL_TAG { driver, group, tag_name } => {
                let body = serde_json::json!({ "driver": driver, "group": group, "tag_name": tag_name });
                let resp = match self.plugin.request("del_tag", body) {
                    Ok(v) => MessageType::RESP_DEL_TAG { ok: v.as_bool().unwrap_or(true) },
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::ADD_GTAG { driver, group, tags_json } => {
                let count = tags_json.len() as u32;
                let body = serde_json::json!({ "driver": driver, "group": group, "tags": tags_json });
                let resp = match self.plugin.request("add_gtag", body) {
                    Ok(v) => {
                        let added = v.get("added").and_then(|x| x.as_u64()).unwrap_or(count as u64) as u32;
                        let failed = v.get("failed").and_then(|x| x.as_u64()).unwrap_or(0) as u32;
                        MessageType::RESP_ADD_GTAG { added, failed }
                    }
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::GET_TAG { driver, group, tag_name } => {
                let body = serde_json::json!({ "driver": driver, "group": group, "tag_name": tag_name });
                let resp = match self.plugin.request("get_tag", body) {
                    Ok(v) => {
                        let tags = match v {
                            serde_json::Value::Array(a) => a,
                            serde_json::Value::Null => Vec::new(),
                            other => vec![other],
                        };
                        MessageType::RESP_GET_TAG { tags }
                    }
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::GET_SUB_DRIVER_TAGS { driver, group } => {
                let body = serde_json::json!({ "driver": driver, "group": group });
                let resp = match self.plugin.request("get_sub_driver_tags", body) {
                    Ok(v) => {
                        let tags = v
                            .as_array()
                            .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
                            .unwrap_or_default();
                        MessageType::RESP_GET_SUB_DRIVER_TAGS { tags }
                    }
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }

            MessageType::WRITE_TAG(req) => {
                let tag_name = req.tag_name.clone();
                let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
                let kind = match self.plugin.request("write_tag", body) {
                    Ok(_) => ErrorKind::Success,
                    Err(e) => e.kind(),
                };
                self.reply_to_manager(&origin, ctx, trace, MessageType::RESP_WRITE_TAGS { results: vec![(tag_name, kind)] });
            }
            MessageType::WRITE_TAGS(req) => {
                let tag_names: Vec<String> = req.tags.iter().map(|t| t.tag_name.clone()).collect();
                let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
                let results = match self.plugin.request("write_tags", body) {
                    Ok(_) => tag_names.into_iter().map(|n| (n, ErrorKind::Success)).collect(),
                    Err(e) => {
                        let kind = e.kind();
                        tag_names.into_iter().map(|n| (n, kind)).collect()
                    }
                };
                self.reply_to_manager(&origin, ctx, trace, MessageType::RESP_WRITE_TAGS { results });
            }
            MessageType::WRITE_GTAGS { writes } => {
                let mut results = Vec::new();
                for req in &writes {
                    let body = serde_json::to_value(req).unwrap_or(serde_json::Value::Null);
                    match self.plugin.request("write_tags", body) {
                        Ok(_) => results.extend(req.tags.iter().map(|t| (t.tag_name.clone(), ErrorKind::Success))),
                        Err(e) => {
                            let kind = e.kind();
                            results.extend(req.tags.iter().map(|t| (t.tag_name.clone(), kind)));
                        }
                    }
                }
                self.reply_to_manager(&origin, ctx, trace, MessageType::RESP_WRITE_TAGS { results });
            }

            MessageType::READ_GROUP { driver, group } => {
                let body = serde_json::json!({ "driver": driver, "group": group });
                let resp = match self.plugin.request("read_group", body) {
                    Ok(v) => match serde_json::from_value::<TransData>(v) {
                        Ok(data) => MessageType::RESP_READ_GROUP { data },
                        Err(_) => MessageType::RESP_ERROR { error: ErrorKind::PluginReadFailure },
                    },
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::TEST_READ_TAG { driver, group, tag_name } => {
                let body = serde_json::json!({ "driver": driver, "group": group, "tag_name": tag_name });
                let resp = match self.plugin.request("test_read_tag", body) {
                    Ok(v) => match serde_json::from_value::<TagSample>(v) {
                        Ok(sample) => MessageType::RESP_TEST_READ_TAG { sample },
                        Err(_) => MessageType::RESP_ERROR { error: ErrorKind::PluginReadFailure },
                    },
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }
            MessageType::SCAN_TAGS { driver, group } => {
                let body = serde_json::json!({ "driver": driver, "group": group });
                let resp = match self.plugin.request("scan_tags", body) {
                    Ok(v) => match serde_json::from_value::<Vec<TagSample>>(v) {
                        Ok(samples) => MessageType::RESP_SCAN_TAGS { samples },
                        Err(_) => MessageType::RESP_ERROR { error: ErrorKind::PluginReadFailure },
                    },
                    Err(e) => MessageType::RESP_ERROR { error: e.kind() },
                };
                self.reply_to_manager(&origin, ctx, trace, resp);
            }

            _ => {}
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::error::GatewayError;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Plugin stub that echoes `request()`'s op name back as the
    /// response body so tests can assert which op the runtime picked.
    struct EchoPlugin;

    impl Plugin for EchoPlugin {
        fn open(&mut self) -> Result<(), GatewayError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn init(&mut self, _setting: &serde_json::Value) -> Result<(), GatewayError> {
            Ok(())
        }
        fn uninit(&mut self) {}
        fn start(&mut self) -> Result<(), GatewayError> {
            Ok(())
        }
        fn stop(&mut self) {}
        fn setting(&mut self, _setting: &serde_json::Value) -> Result<(), GatewayError> {
            Ok(())
        }
        fn request(&mut self, op: &str, _body: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
            match op {
                "del_tag" => Ok(serde_json::json!(true)),
                _ => Ok(serde_json::json!(op)),
            }
        }
    }

    async fn recv(endpoint: &mut gateway_core::bus::Endpoint) -> Envelope {
        timeout(Duration::from_secs(1), endpoint.recv()).await.expect("timed out").expect("closed").1
    }

    #[tokio::test]
    async fn add_tag_forwards_to_plugin_and_replies_to_origin() {
        let bus = Arc::new(Bus::new());
        let mut manager_ep = bus.register("manager");
        let runtime = NodeRuntime::new("d1", bus.clone(), Box::new(EchoPlugin));
        let task = tokio::spawn(runtime.run());

        assert!(matches!(recv(&mut manager_ep).await.body, MessageType::NODE_INIT));

        let env = Envelope::new("admin", "d1", MessageType::ADD_TAG { driver: "d1".into(), group: "g1".into(), tag_json: serde_json::json!({}) });
        bus.try_send("admin", "d1", env).unwrap();

        let reply = recv(&mut manager_ep).await;
        assert_eq!(reply.receiver, "admin");
        assert!(matches!(reply.body, MessageType::RESP_ADD_TAG { ok: true }));

        bus.try_send("manager", "d1", Envelope::new("manager", "d1", MessageType::NODE_UNINIT)).unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn write_tag_reports_plugin_failure_as_resp_write_tags() {
        struct FailingPlugin;
        impl Plugin for FailingPlugin {
            fn open(&mut self) -> Result<(), GatewayError> {
                Ok(())
            }
            fn close(&mut self) {}
            fn init(&mut self, _setting: &serde_json::Value) -> Result<(), GatewayError> {
                Ok(())
            }
            fn uninit(&mut self) {}
            fn start(&mut self) -> Result<(), GatewayError> {
                Ok(())
            }
            fn stop(&mut self) {}
            fn setting(&mut self, _setting: &serde_json::Value) -> Result<(), GatewayError> {
                Ok(())
            }
            fn request(&mut self, _op: &str, _body: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
                Err(GatewayError::Kind(ErrorKind::PluginTagNotAllowWrite))
            }
        }

        let bus = Arc::new(Bus::new());
        let mut manager_ep = bus.register("manager");
        let runtime = NodeRuntime::new("d1", bus.clone(), Box::new(FailingPlugin));
        let task = tokio::spawn(runtime.run());
        let _ = recv(&mut manager_ep).await; // NODE_INIT

        let req = gateway_core::message::WriteTagReq {
            node_name: "d1".into(),
            group_name: "g1".into(),
            tag_name: "t1".into(),
            value: gateway_core::message::WriteValue::Int(1),
            precision: None,
        };
        let env = Envelope::new("admin", "d1", MessageType::WRITE_TAG(req));
        bus.try_send("admin", "d1", env).unwrap();

        let reply = recv(&mut manager_ep).await;
        match reply.body {
            MessageType::RESP_WRITE_TAGS { results } => {
                assert_eq!(results, vec![("t1".to_string(), ErrorKind::PluginTagNotAllowWrite)]);
            }
            other => panic!("expected RESP_WRITE_TAGS, got {other:?}"),
        }

        bus.try_send("manager", "d1", Envelope::new("manager", "d1", MessageType::NODE_UNINIT)).unwrap();
        let _ = task.await;
    }
}
