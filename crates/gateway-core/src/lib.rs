// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core registries and transport for the gateway node runtime.
//!
//! This crate owns the state that the manager loop (`gateway-manager`)
//! mutates: the plugin registry, the node registry, the subscription
//! registry, and the in-process message bus that carries envelopes
//! between nodes and the manager.

pub mod bus;
pub mod error;
pub mod message;
pub mod node;
pub mod plugin;
pub mod subscription;

pub use bus::{Bus, BusError, Endpoint};
pub use error::{ErrorKind, GatewayError};
pub use message::{Envelope, MessageType, TraceCtx};
pub use node::{LinkState, Node, NodeKind, NodeRegistry, NodeState};
pub use plugin::{PluginDescriptor, PluginKind, PluginRegistry, PluginType, PluginVersion};
pub use subscription::{Subscription, SubscriptionRegistry};
