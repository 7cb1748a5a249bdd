// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway daemon (C12).
//!
//! Wires the plugin/node/subscription registries, the manager dispatch
//! loop, the Modbus driver and eKuiper app cores, the tracing sidecar,
//! and the persistence adapter into one running process, following the
//! teacher's `clap::Parser`-derived `Args` + `#[tokio::main]` shape.

mod config;

use clap::Parser;
use config::{AppNodeConfig, DriverNodeConfig, GatewayConfig};
use gateway_core::bus::Bus;
use gateway_core::message::{Envelope, MessageType};
use gateway_core::plugin::{Plugin, PluginDescriptor, PluginKind, PluginRegistry, PluginType, PluginVersion};
use gateway_ekuiper::AppListener;
use gateway_manager::{GroupScheduler, Manager, NodeRuntime};
use gateway_modbus::{Connection, DriverConfig, ModbusDriver};
use gateway_persistence::{NodeRecord, PersistenceStore, SqliteStore};
use gateway_tracing::metrics::GatewayMetrics;
use gateway_tracing::OtlpConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Industrial IoT gateway daemon.
#[derive(Parser, Debug)]
#[command(name = "gateway-daemon")]
#[command(about = "Mediates field-bus drivers and streaming-SQL applications")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Minimum log level (overrides the config file).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Directory for the SQLite persistence database.
    #[arg(short, long)]
    data_dir: Option<String>,
}

const RUNTIME_VERSION: PluginVersion = PluginVersion { major: 1, minor: 0, patch: 0 };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };

    let level_str = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let level = gateway_logging::LogLevel::parse(&level_str).unwrap_or_default();

    // OTLP export and the plain `fmt` subscriber both want to own the
    // process-wide `tracing` dispatcher, so pick exactly one; falling
    // back to plain logging keeps `UPDATE_LOG_LEVEL` live either way
    // (it is a no-op if `gateway_logging::init` was never called).
    let _otlp_guard = match config.otlp.as_ref().filter(|o| o.enabled) {
        Some(otlp) => {
            let otlp_config = OtlpConfig {
                endpoint: otlp.endpoint.clone(),
                service_name: otlp.service_name.clone(),
                export_traces: otlp.export_traces,
                export_metrics: otlp.export_metrics,
                ..Default::default()
            };
            match gateway_tracing::init_tracing(otlp_config) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    eprintln!("failed to init OTLP tracing: {e}, falling back to plain logging");
                    gateway_logging::init(level);
                    None
                }
            }
        }
        None => {
            gateway_logging::init(level);
            None
        }
    };

    let data_dir = args.data_dir.clone().or_else(|| config.data_dir.clone());
    let store = match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Some(Arc::new(SqliteStore::new(&format!("{dir}/gateway.db"))?))
        }
        None => None,
    };

    info!(version = env!("CARGO_PKG_VERSION"), "starting gateway daemon");

    let bus = Arc::new(Bus::new());
    let metrics = Arc::new(GatewayMetrics::new());
    let plugins = builtin_plugin_registry();
    let mut manager = Manager::new(bus.clone(), plugins);
    if let Some(store) = &store {
        manager = manager.with_store(store.clone() as Arc<dyn PersistenceStore>);
    }
    let manager_task: JoinHandle<()> = tokio::spawn(async move {
        manager.run().await;
    });

    let mut node_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut scheduler_handles = Vec::new();
    let mut node_names: Vec<String> = Vec::new();

    for driver in &config.drivers {
        let (task, schedulers) = spawn_driver(bus.clone(), driver, store.as_deref(), metrics.clone());
        node_names.push(driver.name.clone());
        node_tasks.push(task);
        scheduler_handles.extend(schedulers);
    }

    for app in &config.apps {
        let task = spawn_app(bus.clone(), app).await?;
        node_names.push(app.name.clone());
        node_tasks.push(task);
    }

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received, draining nodes");
        }
    }

    for handle in &scheduler_handles {
        handle.stop();
    }
    for name in &node_names {
        let _ = bus.try_send("daemon", name, Envelope::new("daemon", name, MessageType::NODE_UNINIT));
    }
    for task in node_tasks {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), task).await;
    }

    manager_task.abort();
    info!("gateway daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Registers the statically known driver and app module kinds so
/// `ADD_NODE` admits them; actual plugin instances for configured nodes
/// are constructed directly by `spawn_driver`/`spawn_app`, not via
/// `PluginRegistry::instantiate` (no hot-loading is supported, §4.1/§9).
fn builtin_plugin_registry() -> PluginRegistry {
    let mut plugins = PluginRegistry::new(RUNTIME_VERSION);
    plugins
        .add(PluginDescriptor::new(
            "modbus-tcp",
            "modbus-tcp.schema",
            PluginKind::System,
            PluginType::Driver,
            RUNTIME_VERSION,
            noop_factory,
        ))
        .expect("builtin modbus-tcp descriptor");
    plugins
        .add(PluginDescriptor::new(
            "ekuiper",
            "ekuiper.schema",
            PluginKind::System,
            PluginType::App,
            RUNTIME_VERSION,
            noop_factory,
        ))
        .expect("builtin ekuiper descriptor");
    plugins
}

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

/// Spawns one Modbus driver node: a `NodeRuntime` carrying the
/// `Plugin` admin lifecycle, plus one `GroupScheduler` timer per
/// configured group, all sharing one physical `Connection`.
fn spawn_driver(
    bus: Arc<Bus>,
    driver: &DriverNodeConfig,
    store: Option<&SqliteStore>,
    metrics: Arc<GatewayMetrics>,
) -> (JoinHandle<()>, Vec<gateway_manager::SchedulerHandle>) {
    let addr: std::net::SocketAddr = driver.address.parse().expect("invalid driver address");
    let backup: Option<std::net::SocketAddr> = driver.backup_address.as_ref().map(|a| a.parse().expect("invalid backup address"));
    let connection = Arc::new(Connection::new(addr, backup));

    let driver_config = DriverConfig {
        max_retries: driver.max_retries.unwrap_or(2),
        retry_interval_ms: driver.retry_interval_ms.unwrap_or(50),
        degrade_cycle: driver.degrade_cycle.unwrap_or(3),
        degrade_time_s: driver.degrade_time_s.unwrap_or(5),
    };

    let reader = Arc::new(ModbusDriver::new(driver.name.clone(), connection.clone(), driver_config).with_metrics(metrics.clone()));
    for group in &driver.groups {
        let points = group.points.iter().cloned().map(Into::into).collect();
        reader.set_group_tags(group.name.clone(), points);
    }

    let plugin_driver: Box<dyn Plugin> = Box::new(ModbusDriver::new(driver.name.clone(), connection, driver_config).with_metrics(metrics));
    let runtime = NodeRuntime::new(driver.name.clone(), bus.clone(), plugin_driver);
    let task = tokio::spawn(runtime.run());

    if let Some(store) = store {
        if let Err(e) = store.put_node(&NodeRecord {
            name: driver.name.clone(),
            module_name: "modbus-tcp".to_string(),
            is_static: true,
            is_single: false,
            state: "running".to_string(),
        }) {
            warn!(error = %e, driver = %driver.name, "failed to persist driver node");
        }
    }

    let _ = bus.try_send(
        &driver.name,
        "manager",
        Envelope::new(
            &driver.name,
            "manager",
            MessageType::ADD_NODE { name: driver.name.clone(), module_name: "modbus-tcp".to_string(), setting: None },
        ),
    );

    let mut handles = Vec::new();
    for group in &driver.groups {
        let _ = bus.try_send(
            &driver.name,
            "manager",
            Envelope::new(&driver.name, "manager", MessageType::ADD_GROUP { group: group.name.clone(), interval_ms: group.interval_ms }),
        );
        handles.push(GroupScheduler::spawn(
            bus.clone(),
            driver.name.clone(),
            group.name.clone(),
            group.interval_ms,
            reader.clone(),
        ));
    }

    (task, handles)
}

/// Spawns one eKuiper-style app node: a TCP listener the streaming-SQL
/// engine connects into (§4.9). Not a `Plugin`; the listener manages
/// its own `NODE_INIT`/teardown handshake directly over the bus.
async fn spawn_app(bus: Arc<Bus>, app: &AppNodeConfig) -> anyhow::Result<JoinHandle<()>> {
    let _ = bus.try_send(
        &app.name,
        "manager",
        Envelope::new(
            &app.name,
            "manager",
            MessageType::ADD_NODE { name: app.name.clone(), module_name: "ekuiper".to_string(), setting: None },
        ),
    );
    let listener = AppListener::bind(app.name.clone(), bus, &app.listen_addr).await?;
    Ok(tokio::spawn(listener.run()))
}
