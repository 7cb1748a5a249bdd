// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus function codes and PDU (protocol data unit) encode/decode,
//! shared by the TCP (MBAP) and RTU framings.

pub mod rtu;
pub mod tcp;

use crate::error::ModbusError;
use crate::point::Area;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadDiscreteInputs => 0x02,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
            FunctionCode::WriteMultipleRegisters => 0x10,
        }
    }

    pub fn is_error(code: u8) -> bool {
        code & 0x80 != 0
    }

    pub fn read_for(area: Area) -> Self {
        match area {
            Area::Coil => FunctionCode::ReadCoils,
            Area::DiscreteInput => FunctionCode::ReadDiscreteInputs,
            Area::InputRegister => FunctionCode::ReadInputRegisters,
            Area::HoldingRegister => FunctionCode::ReadHoldingRegisters,
        }
    }

    pub fn write_single_for(area: Area) -> Result<Self, ModbusError> {
        match area {
            Area::Coil => Ok(FunctionCode::WriteSingleCoil),
            Area::HoldingRegister => Ok(FunctionCode::WriteSingleRegister),
            Area::DiscreteInput | Area::InputRegister => Err(ModbusError::NotWritable),
        }
    }

    pub fn write_multiple_for(area: Area) -> Result<Self, ModbusError> {
        match area {
            Area::Coil => Ok(FunctionCode::WriteMultipleCoils),
            Area::HoldingRegister => Ok(FunctionCode::WriteMultipleRegisters),
            Area::DiscreteInput | Area::InputRegister => Err(ModbusError::NotWritable),
        }
    }
}

/// Build the read-request PDU: `[fc, start_hi, start_lo, count_hi, count_lo]`.
pub fn encode_read_request(area: Area, start_address: u16, register_count: u16) -> Vec<u8> {
    let fc = FunctionCode::read_for(area).code();
    let mut pdu = Vec::with_capacity(5);
    pdu.push(fc);
    pdu.extend_from_slice(&start_address.to_be_bytes());
    pdu.extend_from_slice(&register_count.to_be_bytes());
    pdu
}

/// Decode a read-response PDU's data bytes (after the byte-count field),
/// returning an error if the function code is an exception.
pub fn decode_read_response<'a>(pdu: &'a [u8]) -> Result<&'a [u8], ModbusError> {
    if pdu.len() < 2 {
        return Err(ModbusError::DecodeFailure);
    }
    let fc = pdu[0];
    if FunctionCode::is_error(fc) {
        return Err(ModbusError::DeviceErr);
    }
    let byte_count = pdu[1] as usize;
    let data = &pdu[2..];
    if data.len() < byte_count {
        return Err(ModbusError::DecodeFailure);
    }
    Ok(&data[..byte_count])
}
