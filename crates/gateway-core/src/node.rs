// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node registry (C2).
//!
//! Generalizes the discovery server's `ParticipantRegistry` (secondary
//! indices, cascading removal) from DDS participants to gateway nodes.

use crate::error::GatewayError;
use crate::plugin::PluginType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Driver,
    App,
}

impl From<PluginType> for NodeKind {
    fn from(t: PluginType) -> Self {
        match t {
            PluginType::Driver => NodeKind::Driver,
            PluginType::App => NodeKind::App,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Init,
    Ready,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub module_name: String,
    pub kind: NodeKind,
    pub state: NodeState,
    pub link_state: LinkState,
    pub is_static: bool,
    pub is_single: bool,
    pub display: bool,
    pub rtt_ms: Option<u64>,
    address: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, module_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            module_name: module_name.into(),
            kind,
            state: NodeState::Init,
            link_state: LinkState::Disconnected,
            is_static: false,
            is_single: false,
            display: true,
            rtt_ms: None,
            address: None,
        }
    }

    /// `get_addr(n) != None` iff the node is in `{Ready, Running, Stopped}`.
    pub fn address(&self) -> Option<&str> {
        match self.state {
            NodeState::Ready | NodeState::Running | NodeState::Stopped => self.address.as_deref(),
            NodeState::Init => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub kind: Option<NodeKind>,
    pub module_name: Option<String>,
    pub name_contains: Option<String>,
    pub state: Option<NodeState>,
    pub link: Option<LinkState>,
}

impl NodeFilter {
    fn matches(&self, n: &Node) -> bool {
        if let Some(k) = self.kind {
            if n.kind != k {
                return false;
            }
        }
        if let Some(m) = &self.module_name {
            if &n.module_name != m {
                return false;
            }
        }
        if let Some(s) = &self.name_contains {
            if !n.name.contains(s.as_str()) {
                return false;
            }
        }
        if let Some(st) = self.state {
            if n.state != st {
                return false;
            }
        }
        if let Some(l) = self.link {
            if n.link_state != l {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Node>,
    monitor: Option<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> Result<(), GatewayError> {
        if self.nodes.contains_key(&node.name) {
            return Err(GatewayError::NodeNameConflict(node.name));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    pub fn add_static(&mut self, mut node: Node) -> Result<(), GatewayError> {
        node.is_static = true;
        self.add(node)
    }

    pub fn add_single(&mut self, mut node: Node, display: bool) -> Result<(), GatewayError> {
        node.is_single = true;
        node.display = display;
        self.add(node)
    }

    /// Atomic rename with name-uniqueness check.
    pub fn update_name(&mut self, old: &str, new: &str) -> Result<(), GatewayError> {
        if self.nodes.contains_key(new) {
            return Err(GatewayError::NodeNameConflict(new.to_string()));
        }
        let mut node = self.nodes.remove(old)
            .ok_or_else(|| GatewayError::NodeNotFound(old.to_string()))?;
        node.name = new.to_string();
        self.nodes.insert(new.to_string(), node);
        Ok(())
    }

    pub fn update_address(&mut self, name: &str, address: impl Into<String>) -> Result<(), GatewayError> {
        let node = self.nodes.get_mut(name)
            .ok_or_else(|| GatewayError::NodeNotFound(name.to_string()))?;
        node.address = Some(address.into());
        if node.state == NodeState::Init {
            node.state = NodeState::Ready;
        }
        Ok(())
    }

    pub fn del(&mut self, name: &str) -> Result<Node, GatewayError> {
        match self.nodes.get(name) {
            None => Err(GatewayError::NodeNotFound(name.to_string())),
            Some(n) if n.is_static || n.is_single => Err(GatewayError::NotAllowedToDelete(name.to_string())),
            Some(_) => Ok(self.nodes.remove(name).unwrap()),
        }
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn is_single(&self, name: &str) -> bool {
        self.nodes.get(name).map(|n| n.is_single).unwrap_or(false)
    }

    pub fn is_driver(&self, name: &str) -> bool {
        self.nodes.get(name).map(|n| n.kind == NodeKind::Driver).unwrap_or(false)
    }

    /// Designates `name` as the node notified of add/delete events for
    /// every other node (§4.5 node admin).
    pub fn set_monitor(&mut self, name: impl Into<String>) {
        self.monitor = Some(name.into());
    }

    pub fn monitor(&self) -> Option<&str> {
        self.monitor.as_deref()
    }

    pub fn is_monitor(&self, name: &str) -> bool {
        self.monitor.as_deref() == Some(name)
    }

    pub fn set_rtt(&mut self, name: &str, rtt_ms: u64) -> Result<(), GatewayError> {
        let node = self.nodes.get_mut(name)
            .ok_or_else(|| GatewayError::NodeNotFound(name.to_string()))?;
        node.rtt_ms = Some(rtt_ms);
        Ok(())
    }

    pub fn get_addr(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).and_then(|n| n.address())
    }

    /// Lists nodes matching `filter`, optionally ordered by last known
    /// round-trip time ascending (nodes with no measurement sort last).
    pub fn list(&self, filter: &NodeFilter, sort_by_rtt: bool) -> Vec<&Node> {
        let mut result: Vec<&Node> = self.nodes.values().filter(|n| filter.matches(n)).collect();
        if sort_by_rtt {
            result.sort_by_key(|n| n.rtt_ms.unwrap_or(u64::MAX));
        }
        result
    }

    /// Snapshot of every node's lifecycle and link state, backing
    /// `RESP_GET_NODES_STATE` (§4.2).
    pub fn enum_states(&self) -> Vec<(String, NodeState, LinkState)> {
        self.nodes.values().map(|n| (n.name.clone(), n.state, n.link_state)).collect()
    }

    pub fn set_state(&mut self, name: &str, state: NodeState) -> Result<(), GatewayError> {
        let node = self.nodes.get_mut(name)
            .ok_or_else(|| GatewayError::NodeNotFound(name.to_string()))?;
        node.state = state;
        Ok(())
    }

    pub fn set_link(&mut self, name: &str, link: LinkState) -> Result<(), GatewayError> {
        let node = self.nodes.get_mut(name)
            .ok_or_else(|| GatewayError::NodeNotFound(name.to_string()))?;
        node.link_state = link;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("d1", "modbus", NodeKind::Driver)).unwrap();
        assert!(reg.find("d1").is_some());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("d1", "modbus", NodeKind::Driver)).unwrap();
        assert!(reg.add(Node::new("d1", "modbus", NodeKind::Driver)).is_err());
    }

    #[test]
    fn static_node_cannot_be_deleted() {
        let mut reg = NodeRegistry::new();
        reg.add_static(Node::new("monitor", "monitor", NodeKind::App)).unwrap();
        assert!(reg.del("monitor").is_err());
    }

    #[test]
    fn address_only_visible_once_ready() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("d1", "modbus", NodeKind::Driver)).unwrap();
        assert_eq!(reg.get_addr("d1"), None);
        reg.update_address("d1", "bus://d1").unwrap();
        assert_eq!(reg.get_addr("d1"), Some("bus://d1"));
    }

    #[test]
    fn rename_checks_uniqueness() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("d1", "modbus", NodeKind::Driver)).unwrap();
        reg.add(Node::new("d2", "modbus", NodeKind::Driver)).unwrap();
        assert!(reg.update_name("d1", "d2").is_err());
        reg.update_name("d1", "d3").unwrap();
        assert!(reg.find("d3").is_some());
        assert!(reg.find("d1").is_none());
    }

    #[test]
    fn list_filters_by_kind_and_name() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("d1", "modbus", NodeKind::Driver)).unwrap();
        reg.add(Node::new("a1", "ekuiper", NodeKind::App)).unwrap();
        let filter = NodeFilter { kind: Some(NodeKind::Driver), ..Default::default() };
        let result = reg.list(&filter, false);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "d1");
    }

    #[test]
    fn list_sorts_by_rtt_when_requested() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("d1", "modbus", NodeKind::Driver)).unwrap();
        reg.add(Node::new("d2", "modbus", NodeKind::Driver)).unwrap();
        reg.set_rtt("d1", 50).unwrap();
        reg.set_rtt("d2", 10).unwrap();
        let result = reg.list(&NodeFilter::default(), true);
        assert_eq!(result[0].name, "d2");
        assert_eq!(result[1].name, "d1");
    }

    #[test]
    fn monitor_designation_is_queryable() {
        let mut reg = NodeRegistry::new();
        reg.add(Node::new("mon", "monitor", NodeKind::App)).unwrap();
        assert!(!reg.is_monitor("mon"));
        reg.set_monitor("mon");
        assert!(reg.is_monitor("mon"));
        assert!(!reg.is_monitor("d1"));
    }
}
