// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus RTU framing: `[UnitId][PDU][CRC_lo][CRC_hi]`.

use crate::crc::crc16;
use crate::error::ModbusError;

pub fn encode(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + pdu.len() + 2);
    out.push(unit_id);
    out.extend_from_slice(pdu);
    let crc = crc16(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

pub fn decode(frame: &[u8]) -> Result<(u8, Vec<u8>), ModbusError> {
    if frame.len() < 4 {
        return Err(ModbusError::DecodeFailure);
    }
    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let expected = crc16(body);
    let actual = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    if expected != actual {
        return Err(ModbusError::DecodeFailure);
    }
    Ok((body[0], body[1..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let encoded = encode(1, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        let (unit_id, pdu) = decode(&encoded).unwrap();
        assert_eq!(unit_id, 1);
        assert_eq!(pdu, vec![0x03, 0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn bad_crc_fails() {
        let mut encoded = encode(1, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(decode(&encoded).is_err());
    }
}
