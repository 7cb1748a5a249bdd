// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence store abstraction (§6 "Persistence contract").
//!
//! Defines the key-value shaped trait the core consumes; `SqliteStore`
//! is the default implementation.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A persisted node: identity plus the static admission flags the
/// manager needs to rebuild its registry on restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub module_name: String,
    pub is_static: bool,
    pub is_single: bool,
    /// Last known lifecycle state ("running" or "stopped"), consulted
    /// on `NODE_INIT` to decide whether the manager re-asserts
    /// `NODE_CTL{start}` after a restart.
    pub state: String,
}

/// A persisted group on a driver node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub interval_ms: u64,
}

/// A persisted tag definition, stored as the opaque JSON body the
/// driver plugin understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,
    pub tag_json: serde_json::Value,
}

/// A persisted subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub app: String,
    pub driver: String,
    pub group: String,
    pub params: Option<String>,
    pub static_tags: Option<String>,
}

/// A persisted user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub password_hash: String,
    pub role: String,
}

/// Persistence store trait.
///
/// Backend-agnostic interface over the §6 key-value contract. Every
/// call is atomic at the granularity of one invocation; "last write
/// wins" is the only consistency guarantee implementations need to
/// provide for `put_*`/`update_*` pairs on the same key.
pub trait PersistenceStore {
    fn put_node(&self, node: &NodeRecord) -> Result<()>;
    fn delete_node(&self, name: &str) -> Result<()>;
    fn update_node(&self, name: &str, new_name: &str) -> Result<()>;
    fn set_node_state(&self, name: &str, state: &str) -> Result<()>;
    fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    fn put_setting(&self, node: &str, blob: &serde_json::Value) -> Result<()>;
    fn get_setting(&self, node: &str) -> Result<Option<serde_json::Value>>;
    fn delete_setting(&self, node: &str) -> Result<()>;

    fn put_group(&self, driver: &str, group: &GroupRecord) -> Result<()>;
    fn update_group(&self, driver: &str, name: &str, group: &GroupRecord) -> Result<()>;
    fn list_groups(&self, driver: &str) -> Result<Vec<GroupRecord>>;
    fn delete_group(&self, driver: &str, name: &str) -> Result<()>;

    fn put_tag(&self, driver: &str, group: &str, tag: &TagRecord) -> Result<()>;
    fn put_tags_batch(&self, driver: &str, group: &str, tags: &[TagRecord]) -> Result<()>;
    fn list_tags(&self, driver: &str, group: &str) -> Result<Vec<TagRecord>>;
    fn update_tag(&self, driver: &str, group: &str, tag: &TagRecord) -> Result<()>;
    fn delete_tag(&self, driver: &str, group: &str, tag_name: &str) -> Result<()>;

    fn put_subscription(&self, sub: &SubscriptionRecord) -> Result<()>;
    fn update_subscription(&self, sub: &SubscriptionRecord) -> Result<()>;
    fn list_subscriptions(&self, app: &str) -> Result<Vec<SubscriptionRecord>>;
    fn delete_subscription(&self, app: &str, driver: &str, group: &str) -> Result<()>;

    fn put_plugin_list(&self, library_ids: &[String]) -> Result<()>;
    fn list_plugins(&self) -> Result<Vec<String>>;

    fn put_user(&self, user: &UserRecord) -> Result<()>;
    fn get_user(&self, name: &str) -> Result<Option<UserRecord>>;
    fn list_users(&self) -> Result<Vec<UserRecord>>;
    fn delete_user(&self, name: &str) -> Result<()>;
}
