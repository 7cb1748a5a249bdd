// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plugin registry (C1).
//!
//! Plugins are not dynamically loaded: the corpus this runtime is built
//! from carries no `dlopen`-style dependency anywhere, so "loading a
//! library" is resolved here as looking up a statically registered
//! factory by module name (see SPEC_FULL.md §4.1, §9). `kind` remains a
//! deletion-policy flag (`System` may not be deleted), not a loading
//! distinction.

use crate::error::GatewayError;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    System,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Driver,
    App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl PluginVersion {
    /// Admission requires major+minor equality with the runtime.
    pub fn compatible_with(&self, runtime: &PluginVersion) -> bool {
        self.major == runtime.major && self.minor == runtime.minor
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Capability interface every plugin implements; the node runtime is
/// polymorphic over this rather than a dynamic function-pointer table.
pub trait Plugin: Send {
    fn open(&mut self) -> Result<(), GatewayError>;
    fn close(&mut self);
    fn init(&mut self, setting: &serde_json::Value) -> Result<(), GatewayError>;
    fn uninit(&mut self);
    fn start(&mut self) -> Result<(), GatewayError>;
    fn stop(&mut self);
    fn setting(&mut self, setting: &serde_json::Value) -> Result<(), GatewayError>;
    fn request(&mut self, op: &str, body: serde_json::Value) -> Result<serde_json::Value, GatewayError>;
}

pub type PluginFactory = fn() -> Box<dyn Plugin>;

#[derive(Clone)]
pub struct PluginDescriptor {
    pub module_name: String,
    pub schema_name: String,
    pub description: String,
    pub kind: PluginKind,
    pub plugin_type: PluginType,
    pub version: PluginVersion,
    pub single: bool,
    pub single_name: Option<String>,
    pub display: bool,
    factory: PluginFactory,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("module_name", &self.module_name)
            .field("kind", &self.kind)
            .field("plugin_type", &self.plugin_type)
            .field("version", &self.version)
            .finish()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    runtime_version: PluginVersion,
    descriptors: HashMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new(runtime_version: PluginVersion) -> Self {
        Self {
            runtime_version,
            descriptors: HashMap::new(),
        }
    }

    pub fn add(&mut self, descriptor: PluginDescriptor) -> Result<(), GatewayError> {
        if self.descriptors.contains_key(&descriptor.module_name) {
            return Err(GatewayError::NameConflict(descriptor.module_name));
        }
        if !descriptor.version.compatible_with(&self.runtime_version) {
            return Err(GatewayError::Kind(crate::error::ErrorKind::LibraryModuleVersionNotMatch));
        }
        self.descriptors.insert(descriptor.module_name.clone(), descriptor);
        Ok(())
    }

    pub fn update(&mut self, descriptor: PluginDescriptor) -> Result<(), GatewayError> {
        if !self.descriptors.contains_key(&descriptor.module_name) {
            return Err(GatewayError::PluginNotFound(descriptor.module_name));
        }
        self.descriptors.insert(descriptor.module_name.clone(), descriptor);
        Ok(())
    }

    pub fn del(&mut self, module_name: &str) -> Result<(), GatewayError> {
        match self.descriptors.get(module_name) {
            None => Err(GatewayError::PluginNotFound(module_name.to_string())),
            Some(d) if d.kind == PluginKind::System => {
                Err(GatewayError::Kind(crate::error::ErrorKind::LibrarySystemNotAllowDel))
            }
            Some(_) => {
                self.descriptors.remove(module_name);
                Ok(())
            }
        }
    }

    pub fn find(&self, module_name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(module_name)
    }

    pub fn exists(&self, module_name: &str) -> bool {
        self.descriptors.contains_key(module_name)
    }

    pub fn is_single(&self, module_name: &str) -> bool {
        self.descriptors.get(module_name).map(|d| d.single).unwrap_or(false)
    }

    pub fn list_all(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values()
    }

    pub fn list_singles(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values().filter(|d| d.single)
    }

    pub fn instantiate(&self, module_name: &str) -> Result<Box<dyn Plugin>, GatewayError> {
        let d = self.descriptors.get(module_name)
            .ok_or_else(|| GatewayError::PluginNotFound(module_name.to_string()))?;
        Ok((d.factory)())
    }
}

impl PluginDescriptor {
    pub fn new(
        module_name: impl Into<String>,
        schema_name: impl Into<String>,
        kind: PluginKind,
        plugin_type: PluginType,
        version: PluginVersion,
        factory: PluginFactory,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            schema_name: schema_name.into(),
            description: String::new(),
            kind,
            plugin_type,
            version,
            single: false,
            single_name: None,
            display: true,
            factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopPlugin;
    impl Plugin for NoopPlugin {
        fn open(&mut self) -> Result<(), GatewayError> { Ok(()) }
        fn close(&mut self) {}
        fn init(&mut self, _s: &serde_json::Value) -> Result<(), GatewayError> { Ok(()) }
        fn uninit(&mut self) {}
        fn start(&mut self) -> Result<(), GatewayError> { Ok(()) }
        fn stop(&mut self) {}
        fn setting(&mut self, _s: &serde_json::Value) -> Result<(), GatewayError> { Ok(()) }
        fn request(&mut self, _op: &str, _b: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
            Ok(serde_json::Value::Null)
        }
    }

    fn factory() -> Box<dyn Plugin> {
        Box::new(NoopPlugin)
    }

    fn runtime() -> PluginVersion {
        PluginVersion { major: 1, minor: 0, patch: 0 }
    }

    #[test]
    fn add_rejects_duplicate_name() {
        let mut reg = PluginRegistry::new(runtime());
        let d = PluginDescriptor::new("modbus", "modbus.schema", PluginKind::System, PluginType::Driver, runtime(), factory);
        reg.add(d.clone()).unwrap();
        assert!(matches!(reg.add(d), Err(GatewayError::NameConflict(_))));
    }

    #[test]
    fn add_rejects_version_mismatch() {
        let mut reg = PluginRegistry::new(runtime());
        let mut bad_version = runtime();
        bad_version.minor += 1;
        let d = PluginDescriptor::new("modbus", "modbus.schema", PluginKind::Custom, PluginType::Driver, bad_version, factory);
        assert!(reg.add(d).is_err());
    }

    #[test]
    fn system_plugin_cannot_be_deleted() {
        let mut reg = PluginRegistry::new(runtime());
        let d = PluginDescriptor::new("modbus", "modbus.schema", PluginKind::System, PluginType::Driver, runtime(), factory);
        reg.add(d).unwrap();
        assert!(reg.del("modbus").is_err());
    }

    #[test]
    fn custom_plugin_can_be_deleted() {
        let mut reg = PluginRegistry::new(runtime());
        let d = PluginDescriptor::new("ekuiper", "ekuiper.schema", PluginKind::Custom, PluginType::App, runtime(), factory);
        reg.add(d).unwrap();
        reg.del("ekuiper").unwrap();
        assert!(!reg.exists("ekuiper"));
    }

    #[test]
    fn instantiate_unknown_module_fails() {
        let reg = PluginRegistry::new(runtime());
        assert!(reg.instantiate("nope").is_err());
    }
}
