// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Manager dispatch loop (C5).
//!
//! Read one envelope, dispatch on its type, mutate the registries,
//! forward or reply. The "connection" is the bus's `manager` endpoint
//! and the peers are node endpoints rather than TCP sockets.

use gateway_core::bus::{Bus, Endpoint};
use gateway_core::error::ErrorKind;
use gateway_core::message::{Envelope, MessageType, TraceCtx};
use gateway_core::node::{Node, NodeFilter, NodeKind, NodeRegistry};
use gateway_core::plugin::{PluginDescriptor, PluginRegistry};
use gateway_core::subscription::SubscriptionRegistry;
use gateway_persistence::{GroupRecord, NodeRecord, PersistenceStore};
use gateway_tracing::metrics::GatewayMetrics;
use gateway_tracing::TraceStore;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("core error: {0}")]
    Core(#[from] gateway_core::error::GatewayError),
    #[error("bus error: {0}")]
    Bus(#[from] gateway_core::bus::BusError),
}

/// Group metadata the manager keeps to validate subscribe/unsubscribe
/// without round-tripping to the driver; the driver remains the
/// authority on tags within the group.
#[derive(Debug, Clone)]
struct GroupMeta {
    interval_ms: u64,
}

pub struct Manager {
    bus: Arc<Bus>,
    endpoint: Endpoint,
    plugins: PluginRegistry,
    nodes: NodeRegistry,
    subs: SubscriptionRegistry,
    groups: HashMap<(String, String), GroupMeta>,
    /// `DEL_NODE` requests awaiting the addressed node's
    /// `RESP_NODE_UNINIT`, keyed by node name, holding who asked and
    /// their correlation handle (§3 lifecycle invariant).
    pending_deletions: HashMap<String, (String, Option<u64>)>,
    store: Option<Arc<dyn PersistenceStore>>,
    tracer: Arc<TraceStore>,
    metrics: Arc<GatewayMetrics>,
}

impl Manager {
    pub fn new(bus: Arc<Bus>, plugins: PluginRegistry) -> Self {
        let endpoint = bus.register("manager");
        Self {
            bus,
            endpoint,
            plugins,
            nodes: NodeRegistry::new(),
            subs: SubscriptionRegistry::new(),
            groups: HashMap::new(),
            pending_deletions: HashMap::new(),
            store: None,
            tracer: Arc::new(TraceStore::new()),
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    /// Attach a persistence backend; node/plugin admin then survives a
    /// restart (§4 "Plugin admin... persists registry", "Node admin...
    /// persists node and setting").
    pub fn with_store(mut self, store: Arc<dyn PersistenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subs
    }

    /// Single-threaded dispatch loop: one envelope in, one reaction out.
    pub async fn run(&mut self) {
        while let Some((from, envelope)) = self.endpoint.recv().await {
            if let Err(e) = self.process(from, envelope).await {
                warn!(error = %e, "manager dispatch failed");
            }
        }
    }

    async fn reply(&self, to: &str, ctx: Option<u64>, body: MessageType) -> Result<(), ManagerError> {
        let mut env = Envelope::new("manager", to, body);
        env.ctx = ctx;
        self.bus.try_send("manager", to, env)?;
        Ok(())
    }

    async fn reply_error(&self, to: &str, ctx: Option<u64>, kind: ErrorKind) -> Result<(), ManagerError> {
        self.reply(to, ctx, MessageType::RESP_ERROR { error: kind }).await
    }

    /// Forwards `body` to `driver`, addressed so the driver's terminal
    /// response can be routed back to `sender` via `envelope.receiver`
    /// (the `WRITE_TAG`/`WRITE_TAGS` pattern, generalized to every
    /// forwarded-to-driver op in §4.5).
    fn forward_to_driver(
        &self,
        sender: &str,
        driver: &str,
        ctx: Option<u64>,
        trace: Option<TraceCtx>,
        body: MessageType,
    ) -> Result<(), gateway_core::bus::BusError> {
        let mut env = Envelope::new(sender, driver, body);
        env.ctx = ctx;
        env.trace = trace;
        self.bus.try_send(sender, driver, env)
    }

    async fn process(&mut self, from: String, envelope: Envelope) -> Result<(), ManagerError> {
        let ctx = envelope.ctx;
        let sender = envelope.sender.clone();
        debug!(?sender, "manager processing message");

        let trace = self.tracer.open("manager_dispatch");
        let span = self.tracer.add_span(trace, "process");

        let result = self.dispatch(from, sender, ctx, envelope).await;

        if let Some(span) = span {
            self.tracer.set_status(span, if result.is_ok() { "ok" } else { "error" });
        }
        self.tracer.set_final(trace);
        result
    }

    async fn dispatch(&mut self, _from: String, sender: String, ctx: Option<u64>, envelope: Envelope) -> Result<(), ManagerError> {
        match envelope.body {
            MessageType::ADD_PLUGIN { library_id } => {
                match self.plugins.find(&library_id).cloned() {
                    Some(_) => self.reply_error(&sender, ctx, ErrorKind::LibraryNameConflict).await?,
                    None => self.reply_error(&sender, ctx, ErrorKind::LibraryNotFound).await?,
                }
            }
            MessageType::DEL_PLUGIN { module_name } => {
                match self.plugins.del(&module_name) {
                    Ok(()) => {
                        self.persist_plugin_registry();
                        self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
                    }
                    Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                }
            }
            MessageType::UPDATE_PLUGIN { library_id } => {
                // Plugins are statically registered, not hot-loaded (§9);
                // an update to an existing module can't be applied live.
                if self.plugins.exists(&library_id) {
                    self.reply_error(&sender, ctx, ErrorKind::LibraryUpdateFail).await?;
                } else {
                    self.reply_error(&sender, ctx, ErrorKind::LibraryNotFound).await?;
                }
            }
            MessageType::GET_PLUGIN { module_name } => {
                let descriptors: Vec<String> = match module_name {
                    Some(name) => self.plugins.find(&name).map(|d| d.module_name.clone()).into_iter().collect(),
                    None => self.plugins.list_all().map(|d: &PluginDescriptor| d.module_name.clone()).collect(),
                };
                self.reply(&sender, ctx, MessageType::RESP_GET_PLUGIN { descriptors }).await?;
            }
            MessageType::CHECK_SCHEMA { module_name } => {
                self.reply(&sender, ctx, MessageType::RESP_CHECK_SCHEMA { ok: self.plugins.exists(&module_name) }).await?;
            }

            MessageType::ADD_NODE { name, module_name, setting } => {
                if !self.plugins.exists(&module_name) {
                    self.reply_error(&sender, ctx, ErrorKind::LibraryNotFound).await?;
                } else {
                    let kind = self
                        .plugins
                        .find(&module_name)
                        .map(|d| NodeKind::from(d.plugin_type))
                        .unwrap();
                    match self.nodes.add(Node::new(&name, &module_name, kind)) {
                        Ok(()) => {
                            let endpoint = self.bus.register(&name);
                            drop(endpoint); // the node runtime re-registers its own; manager only provisions the name
                            self.nodes.update_address(&name, format!("bus://{name}")).ok();
                            if let Some(store) = &self.store {
                                let _ = store.put_node(&NodeRecord {
                                    name: name.clone(),
                                    module_name: module_name.clone(),
                                    is_static: false,
                                    is_single: false,
                                    state: "running".into(),
                                });
                                if let Some(setting) = &setting {
                                    let _ = store.put_setting(&name, setting);
                                }
                            }
                            self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
                        }
                        Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                    }
                }
            }
            MessageType::UPDATE_NODE { old_name, new_name } => {
                match self.nodes.update_name(&old_name, &new_name) {
                    Ok(()) => {
                        self.subs.update_driver_name(&old_name, &new_name);
                        self.subs.update_app_name(&old_name, &new_name);
                        if let Some(store) = &self.store {
                            let _ = store.update_node(&old_name, &new_name);
                        }
                        self.reply(&sender, ctx, MessageType::RESP_NODE_RENAME).await?;
                    }
                    Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                }
            }
            MessageType::DEL_NODE { name } => {
                for s in self.subs.find_by_driver(&name) {
                    let _ = self.bus.try_send(
                        "manager",
                        &s.app,
                        Envelope::new("manager", &s.app, MessageType::NODE_DELETED { node: name.clone() }),
                    );
                }
                if !self.bus.is_registered(&name) {
                    // Node never came up (or already went down); nothing to drain.
                    self.finish_node_deletion(&name);
                    match self.nodes.del(&name) {
                        Ok(_) => self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?,
                        Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                    }
                } else {
                    self.pending_deletions.insert(name.clone(), (sender.clone(), ctx));
                    let notify = Envelope::new("manager", &name, MessageType::NODE_UNINIT);
                    if let Err(e) = self.bus.try_send("manager", &name, notify) {
                        self.pending_deletions.remove(&name);
                        warn!(error = %e, node = %name, "failed to request node uninit");
                        self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                    }
                }
            }
            MessageType::RESP_NODE_UNINIT => {
                if let Some((requester, req_ctx)) = self.pending_deletions.remove(&sender) {
                    self.finish_node_deletion(&sender);
                    match self.nodes.del(&sender) {
                        Ok(_) => self.reply(&requester, req_ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?,
                        Err(e) => self.reply_error(&requester, req_ctx, e.kind()).await?,
                    }
                } else {
                    debug!(node = %sender, "unsolicited RESP_NODE_UNINIT ignored");
                }
            }
            MessageType::GET_NODE { name } => {
                let names: Vec<String> = match name {
                    Some(n) => self.nodes.find(&n).map(|n| n.name.clone()).into_iter().collect(),
                    None => self.nodes.list(&NodeFilter::default(), false).into_iter().map(|n| n.name.clone()).collect(),
                };
                self.reply(&sender, ctx, MessageType::RESP_GET_NODE { nodes: names }).await?;
            }
            MessageType::NODE_INIT => {
                self.nodes.update_address(&sender, format!("bus://{sender}")).ok();
                info!(node = %sender, "node initialized");
                if let Some(store) = &self.store {
                    if let Ok(Some(setting)) = store.get_setting(&sender) {
                        let _ = self.bus.try_send(
                            "manager",
                            &sender,
                            Envelope::new("manager", &sender, MessageType::NODE_SETTING { setting }),
                        );
                    }
                    let running = store
                        .list_nodes()
                        .ok()
                        .and_then(|nodes| nodes.into_iter().find(|n| n.name == sender))
                        .map(|n| n.state == "running")
                        .unwrap_or(false);
                    if running {
                        let _ = self.bus.try_send(
                            "manager",
                            &sender,
                            Envelope::new("manager", &sender, MessageType::NODE_CTL { start: true }),
                        );
                    }
                }
            }
            MessageType::NODE_UNINIT => {
                // driver/app finished draining; manager was already the one
                // that asked for this via DEL_NODE, so just acknowledge.
                debug!(node = %sender, "node uninitialized");
            }

            MessageType::ADD_GROUP { group, interval_ms } => {
                if !self.nodes.is_driver(&sender) {
                    self.reply_error(&sender, ctx, ErrorKind::GroupNotAllow).await?;
                } else {
                    self.groups.insert((sender.clone(), group.clone()), GroupMeta { interval_ms });
                    if let Some(store) = &self.store {
                        let _ = store.put_group(&sender, &GroupRecord { name: group.clone(), interval_ms });
                    }
                    self.reply(&sender, ctx, MessageType::RESP_UPDATE_DRIVER_GROUP { ok: true }).await?;
                }
            }
            MessageType::DEL_GROUP { group } => {
                self.groups.remove(&(sender.clone(), group.clone()));
                self.subs.remove(&sender, Some(&group));
                if let Some(store) = &self.store {
                    let _ = store.delete_group(&sender, &group);
                }
                self.reply(&sender, ctx, MessageType::RESP_UPDATE_DRIVER_GROUP { ok: true }).await?;
            }
            MessageType::UPDATE_GROUP { group, interval_ms } => {
                if let Some(meta) = self.groups.get_mut(&(sender.clone(), group.clone())) {
                    if let Some(ms) = interval_ms {
                        meta.interval_ms = ms;
                    }
                    if let Some(store) = &self.store {
                        let _ = store.update_group(&sender, &group, &GroupRecord { name: group.clone(), interval_ms: meta.interval_ms });
                    }
                    for s in self.subs.find(&sender, &group) {
                        let _ = self.bus.try_send(
                            "manager",
                            &s.app,
                            Envelope::new("manager", &s.app, MessageType::UPDATE_GROUP { group: group.clone(), interval_ms }),
                        );
                    }
                    self.reply(&sender, ctx, MessageType::RESP_UPDATE_DRIVER_GROUP { ok: true }).await?;
                } else {
                    self.reply_error(&sender, ctx, ErrorKind::GroupNotExist).await?;
                }
            }
            MessageType::GET_GROUP { group } => {
                let groups: Vec<String> = self
                    .groups
                    .keys()
                    .filter(|(d, g)| d == &sender && group.as_ref().map(|want| g == want).unwrap_or(true))
                    .map(|(_, g)| g.clone())
                    .collect();
                self.reply(&sender, ctx, MessageType::RESP_GET_GROUP { groups }).await?;
            }

            MessageType::ADD_TAG { driver, group, tag_json } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::ADD_TAG { driver: driver.clone(), group, tag_json }) {
                    warn!(error = %e, %driver, "failed to forward add_tag");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::UPDATE_TAG { driver, group, tag_json } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::UPDATE_TAG { driver: driver.clone(), group, tag_json }) {
                    warn!(error = %e, %driver, "failed to forward update_tag");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::DEL_TAG { driver, group, tag_name } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::DEL_TAG { driver: driver.clone(), group, tag_name }) {
                    warn!(error = %e, %driver, "failed to forward del_tag");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::ADD_GTAG { driver, group, tags_json } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::ADD_GTAG { driver: driver.clone(), group, tags_json }) {
                    warn!(error = %e, %driver, "failed to forward add_gtag");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::GET_TAG { driver, group, tag_name } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::GET_TAG { driver: driver.clone(), group, tag_name }) {
                    warn!(error = %e, %driver, "failed to forward get_tag");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::GET_SUB_DRIVER_TAGS { driver, group } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::GET_SUB_DRIVER_TAGS { driver: driver.clone(), group }) {
                    warn!(error = %e, %driver, "failed to forward get_sub_driver_tags");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::READ_GROUP { driver, group } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::READ_GROUP { driver: driver.clone(), group }) {
                    warn!(error = %e, %driver, "failed to forward read_group");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::TEST_READ_TAG { driver, group, tag_name } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::TEST_READ_TAG { driver: driver.clone(), group, tag_name }) {
                    warn!(error = %e, %driver, "failed to forward test_read_tag");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::SCAN_TAGS { driver, group } => {
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::SCAN_TAGS { driver: driver.clone(), group }) {
                    warn!(error = %e, %driver, "failed to forward scan_tags");
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                }
            }
            MessageType::WRITE_GTAGS { writes } => {
                match writes.first().map(|w| w.node_name.clone()) {
                    Some(driver) => {
                        if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::WRITE_GTAGS { writes }) {
                            warn!(error = %e, %driver, "failed to forward write_gtags");
                            self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await?;
                        }
                    }
                    None => self.reply_error(&sender, ctx, ErrorKind::ParamIsWrong).await?,
                }
            }

            MessageType::SUBSCRIBE_GROUP { driver, group, params, static_tags, app_addr } => {
                if !self.groups.contains_key(&(driver.clone(), group.clone())) {
                    self.reply_error(&sender, ctx, ErrorKind::GroupNotExist).await?;
                } else {
                    match self.subs.sub(driver.clone(), sender.clone(), group.clone(), params.clone(), static_tags.clone(), app_addr) {
                        Ok(()) => {
                            let notify = Envelope::new(
                                "manager",
                                &driver,
                                MessageType::SUBSCRIBE_GROUP {
                                    driver: driver.clone(),
                                    group: group.clone(),
                                    params,
                                    static_tags,
                                    app_addr: sender.clone(),
                                },
                            );
                            let _ = self.bus.try_send("manager", &driver, notify);
                            self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
                        }
                        Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                    }
                }
            }
            MessageType::SUBSCRIBE_GROUPS { subs } => {
                let mut all_ok = true;
                for (driver, group) in &subs {
                    if !self.groups.contains_key(&(driver.clone(), group.clone())) {
                        all_ok = false;
                        continue;
                    }
                    match self.subs.sub(driver.clone(), sender.clone(), group.clone(), None, None, sender.clone()) {
                        Ok(()) => {
                            let notify = Envelope::new(
                                "manager",
                                driver.clone(),
                                MessageType::SUBSCRIBE_GROUP {
                                    driver: driver.clone(),
                                    group: group.clone(),
                                    params: None,
                                    static_tags: None,
                                    app_addr: sender.clone(),
                                },
                            );
                            let _ = self.bus.try_send("manager", driver, notify);
                        }
                        Err(_) => all_ok = false,
                    }
                }
                if all_ok {
                    self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
                } else {
                    self.reply_error(&sender, ctx, ErrorKind::GroupAlreadySubscribed).await?;
                }
            }
            MessageType::UPDATE_SUBSCRIBE_GROUP { driver, group, params, static_tags } => {
                match self.subs.update_params(&sender, &driver, &group, params.clone(), static_tags.clone()) {
                    Ok(()) => {
                        let notify = Envelope::new(
                            "manager",
                            &driver,
                            MessageType::UPDATE_SUBSCRIBE_GROUP { driver: driver.clone(), group: group.clone(), params, static_tags },
                        );
                        let _ = self.bus.try_send("manager", &driver, notify);
                        self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
                    }
                    Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                }
            }
            MessageType::GET_SUBSCRIBE_GROUP { app } => {
                let target = app.unwrap_or_else(|| sender.clone());
                let subs: Vec<String> = self.subs.get(&target, None, None).into_iter().map(|s| format!("{}:{}", s.driver, s.group)).collect();
                self.reply(&sender, ctx, MessageType::RESP_GET_SUBSCRIBE_GROUP { subs }).await?;
            }
            MessageType::UNSUBSCRIBE_GROUP { driver, group } => {
                match self.subs.unsub(&driver, &sender, &group) {
                    Ok(()) => {
                        let notify = Envelope::new("manager", &driver, MessageType::UNSUBSCRIBE_GROUP { driver: driver.clone(), group: group.clone() });
                        let _ = self.bus.try_send("manager", &driver, notify);
                        self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
                    }
                    Err(e) => self.reply_error(&sender, ctx, e.kind()).await?,
                }
            }

            MessageType::WRITE_TAG(req) => {
                let driver = req.node_name.clone();
                if let Err(e) = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::WRITE_TAG(req)) {
                    self.reply_error(&sender, ctx, ErrorKind::NodeNotExist).await.ok();
                    warn!(error = %e, "failed to forward write to driver");
                }
            }
            MessageType::WRITE_TAGS(req) => {
                let driver = req.node_name.clone();
                let _ = self.forward_to_driver(&sender, &driver, ctx, envelope.trace, MessageType::WRITE_TAGS(req));
            }

            // Terminal responses forwarded from a driver back to whoever
            // originated the request; the destination travels in
            // `envelope.receiver`, not the physical sender.
            MessageType::RESP_ERROR { error } if self.nodes.find(&sender).is_some() => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_ERROR { error }).await?;
            }
            MessageType::RESP_WRITE_TAGS { results } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_WRITE_TAGS { results }).await?;
            }
            MessageType::RESP_ADD_TAG { ok } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_ADD_TAG { ok }).await?;
            }
            MessageType::RESP_UPDATE_TAG { ok } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_UPDATE_TAG { ok }).await?;
            }
            MessageType::RESP_DEL_TAG { ok } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_DEL_TAG { ok }).await?;
            }
            MessageType::RESP_ADD_GTAG { added, failed } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_ADD_GTAG { added, failed }).await?;
            }
            MessageType::RESP_GET_TAG { tags } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_GET_TAG { tags }).await?;
            }
            MessageType::RESP_GET_SUB_DRIVER_TAGS { tags } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_GET_SUB_DRIVER_TAGS { tags }).await?;
            }
            MessageType::RESP_READ_GROUP { data } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_READ_GROUP { data }).await?;
            }
            MessageType::RESP_TEST_READ_TAG { sample } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_TEST_READ_TAG { sample }).await?;
            }
            MessageType::RESP_SCAN_TAGS { samples } => {
                self.reply(&envelope.receiver, ctx, MessageType::RESP_SCAN_TAGS { samples }).await?;
            }

            MessageType::TRANS_DATA(data) => {
                let payload_len = serde_json::to_vec(&data).map(|b| b.len() as u64).unwrap_or(0);
                for s in self.subs.find(&sender, &data.group) {
                    let env = Envelope::new(&sender, &s.app, MessageType::TRANS_DATA(data.clone()));
                    match self.bus.try_send(&sender, &s.app, env) {
                        Ok(()) => self.metrics.record_send(payload_len),
                        Err(e) => {
                            self.metrics.record_send_error();
                            warn!(error = %e, app = %s.app, "failed to forward trans data");
                        }
                    }
                }
            }

            MessageType::UPDATE_LOG_LEVEL { level } => {
                gateway_logging::set_global_level(&level);
                self.reply(&sender, ctx, MessageType::RESP_ERROR { error: ErrorKind::Success }).await?;
            }

            other => {
                debug!(?other, "unhandled message type in manager loop");
            }
        }
        Ok(())
    }

    /// Drops the local bookkeeping for a deleted node; callers still
    /// need to call `self.nodes.del(name)` themselves since its
    /// `Result` carries the reply's error kind.
    fn finish_node_deletion(&mut self, name: &str) {
        self.subs.remove(name, None);
        self.subs.unsub_all(name);
        self.groups.retain(|(d, _), _| d != name);
        if let Some(store) = &self.store {
            let _ = store.delete_node(name);
            let _ = store.delete_setting(name);
        }
    }

    fn persist_plugin_registry(&self) {
        if let Some(store) = &self.store {
            let ids: Vec<String> = self.plugins.list_all().map(|d| d.module_name.clone()).collect();
            let _ = store.put_plugin_list(&ids);
        }
    }
}
