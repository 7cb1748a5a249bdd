// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endianness-aware scalar decode/encode, bit-in-register extraction,
//! and string-subtype decoding (§4.8 Decoding / Writing).

use crate::error::ModbusError;
use crate::point::{DataType, Endianness, StringSubtype};
use gateway_core::message::TagValue;

/// Reorder four raw big-endian bytes per the point's endianness option
/// before interpreting as a 32-bit value.
fn reorder32(bytes: [u8; 4], endianness: Endianness) -> [u8; 4] {
    match endianness {
        Endianness::Abcd => bytes,
        Endianness::Cdab => [bytes[2], bytes[3], bytes[0], bytes[1]],
        Endianness::Badc => [bytes[1], bytes[0], bytes[3], bytes[2]],
        Endianness::Dcba => [bytes[3], bytes[2], bytes[1], bytes[0]],
    }
}

/// 64-bit values use big-endian byte swap only (§4.8).
fn reorder64(bytes: [u8; 8]) -> [u8; 8] {
    let mut out = bytes;
    out.reverse();
    out
}

pub fn decode_scalar(registers: &[u8], data_type: DataType, endianness: Endianness) -> Result<TagValue, ModbusError> {
    match data_type {
        DataType::Bool => {
            let v = registers.first().copied().ok_or(ModbusError::DecodeFailure)?;
            Ok(TagValue::Bool(v != 0))
        }
        DataType::BitInRegister { bit } => {
            if registers.len() < 2 {
                return Err(ModbusError::DecodeFailure);
            }
            let word = u16::from_be_bytes([registers[0], registers[1]]);
            Ok(TagValue::Bool((word >> bit) & 1 == 1))
        }
        DataType::Uint16 => {
            let b = take::<2>(registers)?;
            Ok(TagValue::UInt(u16::from_be_bytes(b) as u64))
        }
        DataType::Int16 => {
            let b = take::<2>(registers)?;
            Ok(TagValue::Int(i16::from_be_bytes(b) as i64))
        }
        DataType::Uint32 => {
            let b = reorder32(take::<4>(registers)?, endianness);
            Ok(TagValue::UInt(u32::from_be_bytes(b) as u64))
        }
        DataType::Int32 => {
            let b = reorder32(take::<4>(registers)?, endianness);
            Ok(TagValue::Int(i32::from_be_bytes(b) as i64))
        }
        DataType::Float32 => {
            let b = reorder32(take::<4>(registers)?, endianness);
            Ok(TagValue::Float(f32::from_be_bytes(b) as f64))
        }
        DataType::Uint64 => {
            let b = reorder64(take::<8>(registers)?);
            Ok(TagValue::UInt(u64::from_be_bytes(b)))
        }
        DataType::Int64 => {
            let b = reorder64(take::<8>(registers)?);
            Ok(TagValue::Int(i64::from_be_bytes(b)))
        }
        DataType::Float64 => {
            let b = reorder64(take::<8>(registers)?);
            Ok(TagValue::Float(f64::from_be_bytes(b)))
        }
        DataType::String { subtype, .. } => Ok(TagValue::String(decode_string(registers, subtype))),
    }
}

fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N], ModbusError> {
    if bytes.len() < N {
        return Err(ModbusError::DecodeFailure);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    Ok(out)
}

fn decode_string(bytes: &[u8], subtype: StringSubtype) -> String {
    let ordered: Vec<u8> = match subtype {
        StringSubtype::H => bytes.to_vec(),
        StringSubtype::L => bytes.chunks(2).flat_map(|c| c.iter().rev().copied().collect::<Vec<_>>()).collect(),
        StringSubtype::D | StringSubtype::E => bytes.to_vec(),
    };
    match std::str::from_utf8(&ordered) {
        Ok(s) => s.trim_end_matches('\0').to_string(),
        Err(_) => "?".to_string(),
    }
}

/// Inverse of `decode_scalar`, for write requests (§4.8 Writing).
pub fn encode_scalar(value: &TagValue, data_type: DataType, endianness: Endianness) -> Result<Vec<u8>, ModbusError> {
    match (data_type, value) {
        (DataType::Bool, TagValue::Bool(b)) => Ok(vec![if *b { 0xFF } else { 0x00 }, 0x00]),
        (DataType::Uint16, TagValue::UInt(v)) => Ok((*v as u16).to_be_bytes().to_vec()),
        (DataType::Int16, TagValue::Int(v)) => Ok((*v as i16).to_be_bytes().to_vec()),
        (DataType::Uint32, TagValue::UInt(v)) => Ok(reorder32((*v as u32).to_be_bytes(), endianness).to_vec()),
        (DataType::Int32, TagValue::Int(v)) => Ok(reorder32((*v as i32).to_be_bytes(), endianness).to_vec()),
        (DataType::Float32, TagValue::Float(v)) => Ok(reorder32((*v as f32).to_be_bytes(), endianness).to_vec()),
        (DataType::Uint64, TagValue::UInt(v)) => Ok(reorder64(v.to_be_bytes()).to_vec()),
        (DataType::Int64, TagValue::Int(v)) => Ok(reorder64(v.to_be_bytes()).to_vec()),
        (DataType::Float64, TagValue::Float(v)) => Ok(reorder64(v.to_be_bytes()).to_vec()),
        _ => Err(ModbusError::DecodeFailure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endianness_decode_matches_each_variant() {
        let bytes = [0x11u8, 0x22, 0x33, 0x44];
        assert_eq!(
            decode_scalar(&bytes, DataType::Int32, Endianness::Abcd).unwrap(),
            TagValue::Int(0x11223344)
        );
        assert_eq!(
            decode_scalar(&bytes, DataType::Int32, Endianness::Cdab).unwrap(),
            TagValue::Int(0x33441122)
        );
        assert_eq!(
            decode_scalar(&bytes, DataType::Int32, Endianness::Badc).unwrap(),
            TagValue::Int(0x22114433)
        );
        assert_eq!(
            decode_scalar(&bytes, DataType::Int32, Endianness::Dcba).unwrap(),
            TagValue::Int(0x44332211)
        );
    }

    #[test]
    fn bit_in_register_extracts_correct_bit() {
        let word = [0b0000_0000u8, 0b0000_0100]; // bit 2 set, big-endian word 0x0004
        let v = decode_scalar(&word, DataType::BitInRegister { bit: 2 }, Endianness::Abcd).unwrap();
        assert_eq!(v, TagValue::Bool(true));
        let v = decode_scalar(&word, DataType::BitInRegister { bit: 0 }, Endianness::Abcd).unwrap();
        assert_eq!(v, TagValue::Bool(false));
    }

    #[test]
    fn encode_decode_round_trip_uint16() {
        let value = TagValue::UInt(4242);
        let bytes = encode_scalar(&value, DataType::Uint16, Endianness::Abcd).unwrap();
        let back = decode_scalar(&bytes, DataType::Uint16, Endianness::Abcd).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn invalid_utf8_string_substitutes_placeholder() {
        let bytes = [0xFF, 0xFE, 0xFD];
        assert_eq!(decode_string(&bytes, StringSubtype::D), "?");
    }

    #[test]
    fn truncated_buffer_is_decode_failure() {
        assert!(decode_scalar(&[0x00], DataType::Uint32, Endianness::Abcd).is_err());
    }
}
