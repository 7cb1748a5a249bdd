// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus driver core (C8).
//!
//! A manual binary frame codec (MBAP for TCP, CRC16 for RTU) built
//! over a blocking `Mutex<TcpStream>` connection, plus the tag-sort and
//! endianness-aware decode/encode passes that turn register blocks into
//! typed samples.

pub mod codec;
pub mod connection;
pub mod crc;
pub mod decode;
pub mod driver;
pub mod error;
pub mod point;
pub mod sort;

pub use connection::Connection;
pub use driver::{DriverConfig, ModbusDriver};
pub use error::ModbusError;
pub use point::{Area, DataType, Endianness, Point, StringSubtype};
