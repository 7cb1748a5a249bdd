// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus TCP (MBAP) framing (§6 "Modbus TCP on-the-wire, exact"):
//! `[TxId:2][ProtoId:2=0][Len:2][UnitId:1][PDU]`, `Len` counts from
//! `UnitId` through the end of the PDU.

use crate::error::ModbusError;

pub struct TcpFrame {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub pdu: Vec<u8>,
}

pub fn encode(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let len = (pdu.len() + 1) as u16;
    let mut out = Vec::with_capacity(7 + pdu.len());
    out.extend_from_slice(&transaction_id.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.push(unit_id);
    out.extend_from_slice(pdu);
    out
}

pub fn decode(frame: &[u8]) -> Result<TcpFrame, ModbusError> {
    if frame.len() < 8 {
        return Err(ModbusError::DecodeFailure);
    }
    let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
    let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
    if length == 0 || length > frame.len() - 6 {
        return Err(ModbusError::DecodeFailure);
    }
    let unit_id = frame[6];
    let pdu = frame[7..6 + length].to_vec();
    Ok(TcpFrame { transaction_id, unit_id, pdu })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let encoded = encode(7, 1, &[0x03, 0x00, 0x00, 0x00, 0x0A]);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.transaction_id, 7);
        assert_eq!(decoded.unit_id, 1);
        assert_eq!(decoded.pdu, vec![0x03, 0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn oversized_length_field_fails() {
        let mut frame = encode(1, 1, &[0x03]);
        frame[5] = 0xFF; // claim a huge length the buffer doesn't have
        assert!(decode(&frame).is_err());
    }
}
