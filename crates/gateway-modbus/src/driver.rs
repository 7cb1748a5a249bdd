// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus driver facade: retry/degrade state machine, `Plugin` and
//! `GroupReader` implementations.
//!
//! Per-command state machine (§4.8): `Idle -> Sent -> WaitFrame ->
//! Decoded | DeviceErr | Timeout | DecodeErr`. Blocking socket I/O runs
//! on `spawn_blocking` so the scheduler's async task never stalls the
//! executor (§5: one thread's worth of blocking work per node).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gateway_core::error::{ErrorKind, GatewayError};
use gateway_core::message::{TagSample, TagValue, TransData, WriteTagReq, WriteTagsReq, WriteValue};
use gateway_core::plugin::Plugin;
use gateway_manager::scheduler::GroupReader;
use gateway_tracing::metrics::GatewayMetrics;
use tracing::{debug, warn};

use crate::codec::{self, tcp, FunctionCode};
use crate::connection::Connection;
use crate::decode::decode_scalar;
use crate::error::ModbusError;
use crate::point::{DataType, Point};
use crate::sort::{tag_sort, ReadCommand};

const DEFAULT_CAP_BYTES: u32 = 240;

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub max_retries: u32,
    pub retry_interval_ms: u64,
    pub degrade_cycle: u32,
    pub degrade_time_s: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_retries: 2, retry_interval_ms: 50, degrade_cycle: 3, degrade_time_s: 5 }
    }
}

#[derive(Default)]
struct SlaveDegradeState {
    fail_count: u32,
    skip_until: Option<Instant>,
}

impl SlaveDegradeState {
    fn is_skipped(&self) -> bool {
        self.skip_until.map(|t| Instant::now() < t).unwrap_or(false)
    }
}

pub struct ModbusDriver {
    name: String,
    config: DriverConfig,
    connection: Arc<Connection>,
    groups: Mutex<HashMap<String, Vec<Point>>>,
    degrade: Arc<Mutex<HashMap<u8, SlaveDegradeState>>>,
    tx_id: Mutex<u16>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl ModbusDriver {
    pub fn new(name: impl Into<String>, connection: Arc<Connection>, config: DriverConfig) -> Self {
        Self {
            name: name.into(),
            config,
            connection,
            groups: Mutex::new(HashMap::new()),
            degrade: Arc::new(Mutex::new(HashMap::new())),
            tx_id: Mutex::new(0),
            metrics: None,
        }
    }

    /// Attaches the shared `gateway.driver.read_latency_ns` histogram
    /// (§4.8 Tracing); every group-read path records into it once set.
    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn set_group_tags(&self, group: impl Into<String>, points: Vec<Point>) {
        self.groups.lock().unwrap().insert(group.into(), points);
    }

    fn next_tx_id(&self) -> u16 {
        let mut guard = self.tx_id.lock().unwrap();
        *guard = guard.wrapping_add(1);
        *guard
    }

    /// Run one command's protocol turn, retrying transport failures up
    /// to `max_retries` times.
    fn run_command(conn: &Connection, tx_id: u16, cmd: &ReadCommand, config: &DriverConfig) -> Result<Vec<u8>, ModbusError> {
        let pdu = codec::encode_read_request(cmd.area, cmd.start_address, cmd.register_count);
        let frame = tcp::encode(tx_id, cmd.slave_id, &pdu);
        let max_response = 9 + cmd.register_count as usize * 2;

        let mut attempts_left = config.max_retries + 1;
        let mut last_err = ModbusError::Timeout;
        while attempts_left > 0 {
            attempts_left -= 1;
            match conn.transact(&frame, max_response) {
                Ok(raw) => match tcp::decode(&raw) {
                    Ok(tcp_frame) if tcp_frame.transaction_id == tx_id => {
                        return codec::decode_read_response(&tcp_frame.pdu).map(|d| d.to_vec());
                    }
                    Ok(_) => last_err = ModbusError::DecodeFailure,
                    Err(e) => last_err = e,
                },
                Err(e) => {
                    last_err = e;
                    if attempts_left > 0 {
                        std::thread::sleep(Duration::from_millis(config.retry_interval_ms));
                    }
                }
            }
        }
        Err(last_err)
    }

    fn decode_command(cmd: &ReadCommand, data: &[u8]) -> Vec<TagSample> {
        cmd.points
            .iter()
            .map(|p| {
                let bit_offset = (p.start_address - cmd.start_address) as usize;
                let byte_offset = if p.area.is_bit_area() { bit_offset / 8 } else { bit_offset * 2 };
                let slice = data.get(byte_offset..).unwrap_or(&[]);
                match decode_scalar(slice, p.data_type, p.endianness) {
                    Ok(v) => TagSample { tag: p.name.clone(), value: Some(v), error: None, metas: HashMap::new() },
                    Err(_) => TagSample {
                        tag: p.name.clone(),
                        value: None,
                        error: Some(ErrorKind::PluginProtocolDecodeFailure),
                        metas: HashMap::new(),
                    },
                }
            })
            .collect()
    }

    fn error_samples(cmd: &ReadCommand, err: ModbusError) -> Vec<TagSample> {
        let kind = modbus_error_kind(err);
        cmd.points
            .iter()
            .map(|p| TagSample { tag: p.name.clone(), value: None, error: Some(kind), metas: HashMap::new() })
            .collect()
    }

    fn run_group_sync(connection: Arc<Connection>, config: DriverConfig, degrade: Arc<Mutex<HashMap<u8, SlaveDegradeState>>>, tx_id_base: u16, points: Vec<Point>) -> Vec<TagSample> {
        let commands = tag_sort(&points, DEFAULT_CAP_BYTES);
        let mut samples = Vec::new();
        for (i, cmd) in commands.iter().enumerate() {
            let skipped = degrade.lock().unwrap().get(&cmd.slave_id).map(|s| s.is_skipped()).unwrap_or(false);
            if skipped {
                debug!(slave = cmd.slave_id, "slave degraded, skipping command");
                continue;
            }
            let tx_id = tx_id_base.wrapping_add(i as u16);
            match Self::run_command(&connection, tx_id, cmd, &config) {
                Ok(data) => {
                    samples.extend(Self::decode_command(cmd, &data));
                    let mut map = degrade.lock().unwrap();
                    if let Some(state) = map.get_mut(&cmd.slave_id) {
                        state.fail_count = 0;
                        state.skip_until = None;
                    }
                }
                Err(e) => {
                    warn!(slave = cmd.slave_id, error = %e, "modbus command failed");
                    samples.extend(Self::error_samples(cmd, e));
                    let mut map = degrade.lock().unwrap();
                    let state = map.entry(cmd.slave_id).or_default();
                    state.fail_count += 1;
                    if state.fail_count >= config.degrade_cycle {
                        state.skip_until = Some(Instant::now() + Duration::from_secs(config.degrade_time_s));
                    }
                }
            }
        }
        samples
    }

    fn find_point(&self, group: &str, tag_name: &str) -> Option<Point> {
        self.groups.lock().unwrap().get(group)?.iter().find(|p| p.name == tag_name).cloned()
    }

    /// Looks up the named tag, validates it is writable, coerces the
    /// wire value against its declared data type, and performs the
    /// write. Each tag is resolved and packed independently so one bad
    /// tag in a `write_tags`/`write_gtags` batch doesn't block the rest.
    fn do_write(&self, group: &str, tag_name: &str, value: &WriteValue) -> Result<(), GatewayError> {
        let point = self.find_point(group, tag_name).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
        if !point.writable || !point.area.is_writable() {
            return Err(GatewayError::Kind(ErrorKind::PluginTagNotAllowWrite));
        }
        let tag_value = coerce_write_value(value, point.data_type).map_err(|e| GatewayError::Kind(modbus_error_kind(e)))?;
        let tx_id = self.next_tx_id();
        write_single(&self.connection, tx_id, &point, &tag_value).map_err(|e| GatewayError::Kind(modbus_error_kind(e)))
    }
}

impl GroupReader for ModbusDriver {
    fn read_group(&self, group: String) -> Pin<Box<dyn Future<Output = TransData> + Send>> {
        let points = self.groups.lock().unwrap().get(&group).cloned().unwrap_or_default();
        let connection = self.connection.clone();
        let config = self.config;
        let driver_name = self.name.clone();
        let tx_id = self.next_tx_id();
        let degrade = self.degrade.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            let start = Instant::now();
            let samples = tokio::task::spawn_blocking(move || {
                Self::run_group_sync(connection, config, degrade, tx_id, points)
            })
            .await
            .unwrap_or_default();
            if let Some(m) = &metrics {
                m.record_read(start.elapsed().as_nanos() as u64);
            }

            TransData {
                driver: driver_name,
                group,
                timestamp_ms: now_ms(),
                samples,
            }
        })
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

impl Plugin for ModbusDriver {
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

    fn request(&mut self, op: &str, body: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        match op {
            "is_degraded" => Ok(serde_json::json!(false)),

            "add_tag" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let point: Point = serde_json::from_value(body.get("tag").cloned().unwrap_or_default())
                    .map_err(|_| GatewayError::Kind(ErrorKind::BodyIsWrong))?;
                let mut groups = self.groups.lock().unwrap();
                let tags = groups.entry(group.to_string()).or_default();
                if tags.iter().any(|p| p.name == point.name) {
                    return Err(GatewayError::Kind(ErrorKind::ParamIsWrong));
                }
                tags.push(point);
                Ok(serde_json::json!(true))
            }

            "update_tag" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let point: Point = serde_json::from_value(body.get("tag").cloned().unwrap_or_default())
                    .map_err(|_| GatewayError::Kind(ErrorKind::BodyIsWrong))?;
                let mut groups = self.groups.lock().unwrap();
                let tags = groups.get_mut(group).ok_or(GatewayError::Kind(ErrorKind::GroupNotExist))?;
                match tags.iter_mut().find(|p| p.name == point.name) {
                    Some(slot) => {
                        *slot = point;
                        Ok(serde_json::json!(true))
                    }
                    None => Err(GatewayError::Kind(ErrorKind::ParamIsWrong)),
                }
            }

            "del_tag" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let tag_name = body.get("tag_name").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let mut groups = self.groups.lock().unwrap();
                let tags = groups.get_mut(group).ok_or(GatewayError::Kind(ErrorKind::GroupNotExist))?;
                let before = tags.len();
                tags.retain(|p| p.name != tag_name);
                Ok(serde_json::json!(tags.len() < before))
            }

            "add_gtag" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let raw_tags = body.get("tags").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                let mut groups = self.groups.lock().unwrap();
                let tags = groups.entry(group.to_string()).or_default();
                let (mut added, mut failed) = (0u32, 0u32);
                for raw in raw_tags {
                    match serde_json::from_value::<Point>(raw) {
                        Ok(point) if !tags.iter().any(|p| p.name == point.name) => {
                            tags.push(point);
                            added += 1;
                        }
                        _ => failed += 1,
                    }
                }
                Ok(serde_json::json!({ "added": added, "failed": failed }))
            }

            "get_tag" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let tag_name = body.get("tag_name").and_then(|v| v.as_str());
                let groups = self.groups.lock().unwrap();
                let tags = groups.get(group).ok_or(GatewayError::Kind(ErrorKind::GroupNotExist))?;
                let matched: Vec<&Point> = tags.iter().filter(|p| tag_name.map(|want| p.name == want).unwrap_or(true)).collect();
                serde_json::to_value(matched).map_err(|_| GatewayError::Kind(ErrorKind::Internal))
            }

            "get_sub_driver_tags" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let groups = self.groups.lock().unwrap();
                let names: Vec<String> = groups.get(group).map(|tags| tags.iter().map(|p| p.name.clone()).collect()).unwrap_or_default();
                Ok(serde_json::json!(names))
            }

            "write_tag" => {
                let req: WriteTagReq = serde_json::from_value(body).map_err(|_| GatewayError::Kind(ErrorKind::BodyIsWrong))?;
                self.do_write(&req.group_name, &req.tag_name, &req.value)?;
                Ok(serde_json::Value::Null)
            }

            "write_tags" => {
                let req: WriteTagsReq = serde_json::from_value(body).map_err(|_| GatewayError::Kind(ErrorKind::BodyIsWrong))?;
                let mut first_err = None;
                for tag in &req.tags {
                    if let Err(e) = self.do_write(&req.group_name, &tag.tag_name, &tag.value) {
                        first_err.get_or_insert(e);
                    }
                }
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(serde_json::Value::Null),
                }
            }

            "read_group" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?.to_string();
                let points = self.groups.lock().unwrap().get(&group).cloned().unwrap_or_default();
                let tx_id = self.next_tx_id();
                let start = Instant::now();
                let samples = Self::run_group_sync(self.connection.clone(), self.config, self.degrade.clone(), tx_id, points);
                if let Some(m) = &self.metrics {
                    m.record_read(start.elapsed().as_nanos() as u64);
                }
                let data = TransData { driver: self.name.clone(), group, timestamp_ms: now_ms(), samples };
                serde_json::to_value(data).map_err(|_| GatewayError::Kind(ErrorKind::Internal))
            }

            "test_read_tag" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let tag_name = body.get("tag_name").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let point = self.find_point(group, tag_name).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let commands = tag_sort(std::slice::from_ref(&point), DEFAULT_CAP_BYTES);
                let cmd = commands.first().ok_or(GatewayError::Kind(ErrorKind::Internal))?;
                let tx_id = self.next_tx_id();
                let start = Instant::now();
                let result = Self::run_command(&self.connection, tx_id, cmd, &self.config);
                if let Some(m) = &self.metrics {
                    m.record_read(start.elapsed().as_nanos() as u64);
                }
                let sample = match result {
                    Ok(data) => Self::decode_command(cmd, &data).into_iter().next(),
                    Err(e) => Self::error_samples(cmd, e).into_iter().next(),
                }
                .ok_or(GatewayError::Kind(ErrorKind::Internal))?;
                serde_json::to_value(sample).map_err(|_| GatewayError::Kind(ErrorKind::Internal))
            }

            "scan_tags" => {
                let group = body.get("group").and_then(|v| v.as_str()).ok_or(GatewayError::Kind(ErrorKind::ParamIsWrong))?;
                let points = self.groups.lock().unwrap().get(group).cloned().unwrap_or_default();
                let tx_id = self.next_tx_id();
                let start = Instant::now();
                let samples = Self::run_group_sync(self.connection.clone(), self.config, self.degrade.clone(), tx_id, points);
                if let Some(m) = &self.metrics {
                    m.record_read(start.elapsed().as_nanos() as u64);
                }
                serde_json::to_value(samples).map_err(|_| GatewayError::Kind(ErrorKind::Internal))
            }

            _ => Ok(serde_json::Value::Null),
        }
    }
}

/// Maps a protocol-level transport/decode failure to the semantic
/// error kind carried back to the app/CLI caller (§4.8 error mapping).
fn modbus_error_kind(err: ModbusError) -> ErrorKind {
    match err {
        ModbusError::Disconnected => ErrorKind::PluginDisconnected,
        ModbusError::Timeout => ErrorKind::PluginDeviceNotResponse,
        ModbusError::DeviceErr => ErrorKind::PluginDeviceNotResponse,
        ModbusError::DecodeFailure => ErrorKind::PluginProtocolDecodeFailure,
        ModbusError::NotWritable => ErrorKind::PluginTagNotAllowWrite,
        ModbusError::Degraded => ErrorKind::PluginDisconnected,
    }
}

/// Coerces a wire `WriteValue` (whose numeric variants carry no
/// precision) against the target point's declared `DataType`, since
/// `WriteValue` has no unsigned variant but several Modbus types are
/// unsigned registers.
fn coerce_write_value(value: &WriteValue, data_type: DataType) -> Result<TagValue, ModbusError> {
    match (data_type, value) {
        (DataType::Bool, WriteValue::Bool(b)) => Ok(TagValue::Bool(*b)),
        (DataType::Bool, WriteValue::Int(i)) => Ok(TagValue::Bool(*i != 0)),
        (DataType::Uint16 | DataType::Uint32 | DataType::Uint64, WriteValue::Int(i)) => Ok(TagValue::UInt(*i as u64)),
        (DataType::Uint16 | DataType::Uint32 | DataType::Uint64, WriteValue::Float(f)) => Ok(TagValue::UInt(*f as u64)),
        (DataType::Int16 | DataType::Int32 | DataType::Int64, WriteValue::Int(i)) => Ok(TagValue::Int(*i)),
        (DataType::Int16 | DataType::Int32 | DataType::Int64, WriteValue::Float(f)) => Ok(TagValue::Int(*f as i64)),
        (DataType::Float32 | DataType::Float64, WriteValue::Float(f)) => Ok(TagValue::Float(*f)),
        (DataType::Float32 | DataType::Float64, WriteValue::Int(i)) => Ok(TagValue::Float(*i as f64)),
        (DataType::String { .. }, WriteValue::String(s)) => Ok(TagValue::String(s.clone())),
        (DataType::BitInRegister { .. }, _) => Err(ModbusError::NotWritable),
        _ => Err(ModbusError::DecodeFailure),
    }
}

/// Writes a single scalar value, choosing the single/multi function
/// code appropriate to the area, after validating the area is
/// writable. Short-circuits (does not proceed to packing) on the first
/// unwritable area (§4.8 Writing / §9 `modbus_stack_write` resolution).
pub fn write_single(connection: &Connection, tx_id: u16, point: &Point, value: &TagValue) -> Result<(), ModbusError> {
    let fc = FunctionCode::write_single_for(point.area)?;
    let bytes = crate::decode::encode_scalar(value, point.data_type, point.endianness)?;
    let mut pdu = vec![fc.code()];
    pdu.extend_from_slice(&point.start_address.to_be_bytes());
    pdu.extend_from_slice(&bytes);
    let frame = tcp::encode(tx_id, point.slave_id, &pdu);
    let response = connection.transact(&frame, 64)?;
    let decoded = tcp::decode(&response)?;
    if FunctionCode::is_error(decoded.pdu.first().copied().unwrap_or(0)) {
        return Err(ModbusError::DeviceErr);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{Area, DataType, Endianness};
    use std::net::TcpListener;

    fn make_point(name: &str, addr: u16) -> Point {
        Point {
            name: name.to_string(),
            slave_id: 1,
            area: Area::HoldingRegister,
            start_address: addr,
            data_type: DataType::Uint16,
            endianness: Endianness::Abcd,
            readable: true,
            writable: true,
        }
    }

    #[tokio::test]
    async fn read_group_decodes_successful_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            use std::io::{Read, Write};
            let (mut sock, _) = listener.accept().unwrap();
            let mut header = [0u8; 12]; // MBAP(7) + fc(1) + addr(2) + count(2)
            sock.read_exact(&mut header).unwrap();
            let tx_id = u16::from_be_bytes([header[0], header[1]]);
            // response: value 42
            let pdu = [0x03, 0x02, 0x00, 0x2A];
            let frame = tcp::encode(tx_id, 1, &pdu);
            sock.write_all(&frame).unwrap();
        });

        let conn = Arc::new(Connection::new(addr, None));
        let driver = ModbusDriver::new("d1", conn, DriverConfig::default());
        driver.set_group_tags("g1", vec![make_point("t1", 0)]);

        let data = driver.read_group("g1".to_string()).await;
        assert_eq!(data.samples.len(), 1);
        assert_eq!(data.samples[0].value, Some(TagValue::UInt(42)));
    }

    #[test]
    fn degrade_triggers_after_configured_failures() {
        let conn = Arc::new(Connection::new("127.0.0.1:1".parse().unwrap(), None));
        let config = DriverConfig { max_retries: 0, retry_interval_ms: 1, degrade_cycle: 2, degrade_time_s: 5 };
        let degrade = Arc::new(Mutex::new(HashMap::new()));
        let points = vec![make_point("t1", 0)];

        for _ in 0..2 {
            ModbusDriver::run_group_sync(conn.clone(), config, degrade.clone(), 1, points.clone());
        }
        assert!(degrade.lock().unwrap().get(&1).unwrap().is_skipped());
    }
}
