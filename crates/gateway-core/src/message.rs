// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message envelope and the request/response taxonomy carried over the bus.
//!
//! Wire format: the same tagged-enum-over-JSON shape the discovery
//! server uses for its own protocol messages (`#[serde(tag = "type")]`),
//! generalized from one connection-level enum to the full manager
//! taxonomy.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque trace-context handle propagated end to end with a request.
pub type TraceCtx = String;

/// One envelope moved across the bus between a node and the manager,
/// or between the manager and a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub receiver: String,
    /// Correlation handle, echoed back on the terminal response.
    #[serde(default)]
    pub ctx: Option<u64>,
    /// Opaque trace context propagated through C10, if tracing is active.
    #[serde(default)]
    pub trace: Option<TraceCtx>,
    #[serde(default)]
    pub monitor: Option<String>,
    #[serde(flatten)]
    pub body: MessageType,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, body: MessageType) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            ctx: None,
            trace: None,
            monitor: None,
            body,
        }
    }

    pub fn with_ctx(mut self, ctx: u64) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn with_trace(mut self, trace: TraceCtx) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// A single tag value, reported either as a successful decode or a
/// per-tag error. Matches §4.9's `values`/`errors` split.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    /// Explicit JSON null / undefined tag value, distinct from "type not
    /// yet known" used only while decoding write requests (see
    /// `WriteValue`). Resolves the auto-detect-vs-terminal ambiguity.
    Null,
}

/// A tag value arriving on a write request, whose numeric type may
/// still need coercion against the tag's declared precision before it
/// becomes a `TagValue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

/// One row of a `TRANS_DATA` publish: a tag's value or its error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSample {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TagValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metas: HashMap<String, String>,
}

/// A batch of samples for one driver/group cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransData {
    pub driver: String,
    pub group: String,
    pub timestamp_ms: i64,
    pub samples: Vec<TagSample>,
}

/// A single-tag write request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteTagReq {
    pub node_name: String,
    pub group_name: String,
    pub tag_name: String,
    pub value: WriteValue,
    #[serde(default)]
    pub precision: Option<u8>,
}

/// A multi-tag write request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteTagsReq {
    pub node_name: String,
    pub group_name: String,
    pub tags: Vec<WriteOne>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOne {
    pub tag_name: String,
    pub value: WriteValue,
    #[serde(default)]
    pub precision: Option<u8>,
}

/// The full request/response taxonomy (§6). Names intentionally match
/// the language-agnostic spec vocabulary rather than Rust convention,
/// since they also serialize as the wire `"type"` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
pub enum MessageType {
    // Plugin admin
    ADD_PLUGIN { library_id: String },
    DEL_PLUGIN { module_name: String },
    UPDATE_PLUGIN { library_id: String },
    GET_PLUGIN { module_name: Option<String> },
    CHECK_SCHEMA { module_name: String },
    RESP_GET_PLUGIN { descriptors: Vec<String> },
    RESP_CHECK_SCHEMA { ok: bool },

    // Node admin
    ADD_NODE { name: String, module_name: String, setting: Option<serde_json::Value> },
    UPDATE_NODE { old_name: String, new_name: String },
    DEL_NODE { name: String },
    GET_NODE { name: Option<String> },
    NODE_SETTING { setting: serde_json::Value },
    NODE_CTL { start: bool },
    NODE_INIT,
    NODE_UNINIT,
    NODE_RENAME { new_name: String },
    RESP_GET_NODE { nodes: Vec<String> },
    RESP_GET_NODE_STATE { state: String, link: String },
    RESP_GET_NODES_STATE { states: Vec<(String, String, String)> },
    RESP_NODE_UNINIT,
    RESP_NODE_RENAME,

    // Group/tag admin
    ADD_GROUP { group: String, interval_ms: u64 },
    DEL_GROUP { group: String },
    UPDATE_GROUP { group: String, interval_ms: Option<u64> },
    GET_GROUP { group: Option<String> },
    ADD_TAG { driver: String, group: String, tag_json: serde_json::Value },
    ADD_GTAG { driver: String, group: String, tags_json: Vec<serde_json::Value> },
    UPDATE_TAG { driver: String, group: String, tag_json: serde_json::Value },
    DEL_TAG { driver: String, group: String, tag_name: String },
    GET_TAG { driver: String, group: String, tag_name: Option<String> },
    RESP_ADD_TAG { ok: bool },
    RESP_ADD_GTAG { added: u32, failed: u32 },
    RESP_UPDATE_TAG { ok: bool },
    RESP_DEL_TAG { ok: bool },
    RESP_GET_TAG { tags: Vec<serde_json::Value> },
    RESP_GET_GROUP { groups: Vec<String> },
    RESP_UPDATE_DRIVER_GROUP { ok: bool },

    // Subscriptions
    SUBSCRIBE_GROUP {
        driver: String,
        group: String,
        params: Option<String>,
        static_tags: Option<String>,
        app_addr: String,
    },
    SUBSCRIBE_GROUPS { subs: Vec<(String, String)> },
    UPDATE_SUBSCRIBE_GROUP {
        driver: String,
        group: String,
        params: Option<String>,
        static_tags: Option<String>,
    },
    UNSUBSCRIBE_GROUP { driver: String, group: String },
    GET_SUBSCRIBE_GROUP { app: Option<String> },
    GET_SUB_DRIVER_TAGS { driver: String, group: String },
    RESP_GET_SUBSCRIBE_GROUP { subs: Vec<String> },
    RESP_GET_SUB_DRIVER_TAGS { tags: Vec<String> },

    // I/O
    READ_GROUP { driver: String, group: String },
    WRITE_TAG(WriteTagReq),
    WRITE_TAGS(WriteTagsReq),
    WRITE_GTAGS { writes: Vec<WriteTagsReq> },
    TEST_READ_TAG { driver: String, group: String, tag_name: String },
    SCAN_TAGS { driver: String, group: String },
    TRANS_DATA(TransData),
    NODE_DELETED { node: String },
    RESP_READ_GROUP { data: TransData },
    RESP_WRITE_TAGS { results: Vec<(String, ErrorKind)> },
    RESP_TEST_READ_TAG { sample: TagSample },
    RESP_SCAN_TAGS { samples: Vec<TagSample> },

    // Diagnostics
    UPDATE_LOG_LEVEL { level: String },
    RESP_ERROR { error: ErrorKind },
}
