// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-framed wire transport (§4.9, §6 "eKuiper frame, bit-exact").
//!
//! `[length:4B BE][body]` where `body` is either raw JSON, or a 26-byte
//! trace header (`0x0A 0xCE` + 16-byte trace id + 8-byte span id)
//! immediately followed by JSON.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const TRACE_MAGIC: [u8; 2] = [0x0A, 0xCE];
const TRACE_HEADER_LEN: usize = 26; // 2 magic + 16 trace id + 8 span id
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds the maximum of {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("frame length was zero")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
}

/// Read one length-prefixed frame and split off its trace header, if
/// any. Returns `(trace, json_bytes)`.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<(Option<TraceHeader>, Vec<u8>), FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    if body.len() >= TRACE_HEADER_LEN && body[0..2] == TRACE_MAGIC {
        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        trace_id.copy_from_slice(&body[2..18]);
        span_id.copy_from_slice(&body[18..26]);
        Ok((Some(TraceHeader { trace_id, span_id }), body.split_off(TRACE_HEADER_LEN)))
    } else {
        Ok((None, body))
    }
}

/// Write one length-prefixed frame, prepending the trace header when
/// `trace` is provided.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, trace: Option<TraceHeader>, json: &[u8]) -> Result<(), FrameError> {
    let mut body = Vec::with_capacity(TRACE_HEADER_LEN + json.len());
    if let Some(t) = trace {
        body.extend_from_slice(&TRACE_MAGIC);
        body.extend_from_slice(&t.trace_id);
        body.extend_from_slice(&t.span_id);
    }
    body.extend_from_slice(json);
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trip_without_trace() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, None, br#"{"a":1}"#).await.unwrap();
        let (trace, body) = read_frame(&mut b).await.unwrap();
        assert!(trace.is_none());
        assert_eq!(body, br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn round_trip_with_trace_header() {
        let (mut a, mut b) = duplex(1024);
        let trace = TraceHeader { trace_id: [7u8; 16], span_id: [9u8; 8] };
        write_frame(&mut a, Some(trace), br#"{"a":1}"#).await.unwrap();
        let (got_trace, body) = read_frame(&mut b).await.unwrap();
        assert_eq!(got_trace, Some(trace));
        assert_eq!(body, br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn zero_length_frame_is_rejected() {
        let (mut a, mut b) = duplex(1024);
        a.write_all(&0u32.to_be_bytes()).await.unwrap();
        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Empty)));
    }
}
