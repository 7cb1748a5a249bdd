// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ModbusError {
    #[error("connection to device is disconnected")]
    Disconnected,
    #[error("device did not respond in time")]
    Timeout,
    #[error("device returned an exception response")]
    DeviceErr,
    #[error("frame failed to decode")]
    DecodeFailure,
    #[error("area is not writable")]
    NotWritable,
    #[error("slave is currently degraded and skipped")]
    Degraded,
}

impl From<std::io::Error> for ModbusError {
    fn from(_: std::io::Error) -> Self {
        ModbusError::Disconnected
    }
}
