// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration (C12).
//!
//! TOML file merged under CLI-provided defaults, following the
//! router's `RouterConfig::from_file`/`validate` pattern.

use gateway_modbus::{Area, DataType, Endianness, Point};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default)]
    pub drivers: Vec<DriverNodeConfig>,

    #[serde(default)]
    pub apps: Vec<AppNodeConfig>,

    #[serde(default)]
    pub otlp: Option<OtlpSettings>,
}

/// TOML-friendly mirror of `gateway_tracing::OtlpConfig`; the daemon
/// builds the real config from this after parsing so the tracing crate
/// doesn't need to derive `Deserialize` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otlp_service_name")]
    pub service_name: String,
    #[serde(default = "default_true")]
    pub export_traces: bool,
    #[serde(default = "default_true")]
    pub export_metrics: bool,
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otlp_service_name() -> String {
    "gateway".to_string()
}

impl GatewayConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for driver in &self.drivers {
            if driver.name.is_empty() {
                return Err(ConfigError::Invalid("driver with empty name".into()));
            }
            for group in &driver.groups {
                if group.interval_ms == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "driver {}: group {} has a zero interval_ms",
                        driver.name, group.name
                    )));
                }
            }
        }
        for app in &self.apps {
            if app.name.is_empty() {
                return Err(ConfigError::Invalid("app with empty name".into()));
            }
        }
        Ok(())
    }
}

/// One configured Modbus driver node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverNodeConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub backup_address: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,
    #[serde(default)]
    pub degrade_cycle: Option<u32>,
    #[serde(default)]
    pub degrade_time_s: Option<u64>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub interval_ms: u64,
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

/// TOML-friendly mirror of `gateway_modbus::Point`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointConfig {
    pub name: String,
    pub slave_id: u8,
    pub area: Area,
    pub start_address: u16,
    pub data_type: DataType,
    #[serde(default = "default_endianness")]
    pub endianness: Endianness,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
}

fn default_endianness() -> Endianness {
    Endianness::Abcd
}

fn default_true() -> bool {
    true
}

impl From<PointConfig> for Point {
    fn from(p: PointConfig) -> Self {
        Point {
            name: p.name,
            slave_id: p.slave_id,
            area: p.area,
            start_address: p.start_address,
            data_type: p.data_type,
            endianness: p.endianness,
            readable: p.readable,
            writable: p.writable,
        }
    }
}

/// One configured eKuiper-style app node: a TCP listener address the
/// streaming-SQL engine connects into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppNodeConfig {
    pub name: String,
    pub listen_addr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero_interval_group() {
        let config = GatewayConfig {
            drivers: vec![DriverNodeConfig {
                name: "plc1".into(),
                address: "127.0.0.1:502".into(),
                backup_address: None,
                max_retries: None,
                retry_interval_ms: None,
                degrade_cycle: None,
                degrade_time_s: None,
                groups: vec![GroupConfig { name: "g1".into(), interval_ms: 0, points: vec![] }],
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_toml_driver_and_points() {
        let toml_str = r#"
            log_level = "debug"

            [[drivers]]
            name = "plc1"
            address = "127.0.0.1:502"

            [[drivers.groups]]
            name = "g1"
            interval_ms = 1000

            [[drivers.groups.points]]
            name = "temp"
            slave_id = 1
            area = "holding_register"
            start_address = 0
            data_type = "float32"
        "#;
        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.drivers.len(), 1);
        assert_eq!(config.drivers[0].groups[0].points[0].name, "temp");
        assert_eq!(config.drivers[0].groups[0].points[0].area, Area::HoldingRegister);
    }
}
