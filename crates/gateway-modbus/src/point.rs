// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus point model (§3, §4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

impl Area {
    /// Registers are read-only by the Modbus spec; writes must be
    /// rejected before any packing proceeds (§4.8 Writing).
    pub fn is_writable(&self) -> bool {
        !matches!(self, Area::DiscreteInput | Area::InputRegister)
    }

    pub fn is_bit_area(&self) -> bool {
        matches!(self, Area::Coil | Area::DiscreteInput)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Abcd,
    Badc,
    Dcba,
    Cdab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringSubtype {
    /// high byte first
    H,
    /// low byte first
    L,
    /// dense
    D,
    /// extended
    E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
    String { len_registers: u16, subtype: StringSubtype },
    BitInRegister { bit: u8 },
}

impl DataType {
    /// Number of 16-bit registers this type occupies.
    pub fn register_count(&self) -> u16 {
        match self {
            DataType::Bool | DataType::BitInRegister { .. } => 1,
            DataType::Uint16 | DataType::Int16 => 1,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 2,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 => 4,
            DataType::String { len_registers, .. } => *len_registers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub name: String,
    pub slave_id: u8,
    pub area: Area,
    pub start_address: u16,
    pub data_type: DataType,
    pub endianness: Endianness,
    pub readable: bool,
    pub writable: bool,
}

impl Point {
    pub fn register_count(&self) -> u16 {
        if self.area.is_bit_area() {
            1
        } else {
            self.data_type.register_count()
        }
    }

    pub fn end_address(&self) -> u16 {
        self.start_address + self.register_count()
    }
}
