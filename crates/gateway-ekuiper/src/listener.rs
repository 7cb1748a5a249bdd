// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pair-socket app listener (§4.9).
//!
//! One `TcpListener` accepts a single peer connection per app node.
//! Generalizes `NodeRuntime`'s register/recv/dispatch loop to a
//! connection that also owns a raw socket: inbound frames become
//! `WRITE_TAG`/`WRITE_TAGS` envelopes sent to `"manager"`; outbound
//! `TRANS_DATA` envelopes received from the bus are framed back onto
//! the wire.

use crate::codec::{decode_write_request, encode_trans_data, WriteRequest};
use crate::frame::{read_frame, write_frame, FrameError, TraceHeader};
use gateway_core::bus::Bus;
use gateway_core::message::{Envelope, MessageType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Disconnection-duration buckets tracked per app node (§4.9).
const DISCONNECT_THRESHOLDS_S: [u64; 3] = [60, 600, 1800];

#[derive(Debug, Default)]
pub struct DisconnectCounters {
    pub over_60s: AtomicU64,
    pub over_600s: AtomicU64,
    pub over_1800s: AtomicU64,
}

impl DisconnectCounters {
    fn record(&self, down_for: Duration) {
        let secs = down_for.as_secs();
        if secs >= DISCONNECT_THRESHOLDS_S[2] {
            self.over_1800s.fetch_add(1, Ordering::Relaxed);
        } else if secs >= DISCONNECT_THRESHOLDS_S[1] {
            self.over_600s.fetch_add(1, Ordering::Relaxed);
        } else if secs >= DISCONNECT_THRESHOLDS_S[0] {
            self.over_60s.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// One app node's pair-socket endpoint: accepts a single peer, then
/// shuttles `TRANS_DATA` out and `WRITE_TAG`/`WRITE_TAGS` in until
/// `NODE_UNINIT`.
pub struct AppListener {
    name: String,
    bus: Arc<Bus>,
    listener: TcpListener,
    counters: Arc<DisconnectCounters>,
}

impl AppListener {
    pub async fn bind(name: impl Into<String>, bus: Arc<Bus>, addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { name: name.into(), bus, listener, counters: Arc::new(DisconnectCounters::default()) })
    }

    pub fn counters(&self) -> Arc<DisconnectCounters> {
        self.counters.clone()
    }

    /// Accept one peer and run until `NODE_UNINIT`, releasing the
    /// socket and bus endpoint on every exit path.
    pub async fn run(self) {
        let mut endpoint = self.bus.register(&self.name);
        let _ = self.bus.try_send(&self.name, "manager", Envelope::new(&self.name, "manager", MessageType::NODE_INIT));

        let stream = match self.listener.accept().await {
            Ok((stream, peer)) => {
                info!(node = %self.name, %peer, "app connected");
                stream
            }
            Err(e) => {
                warn!(node = %self.name, error = %e, "accept failed");
                self.bus.deregister(&self.name);
                return;
            }
        };
        let stream = Arc::new(Mutex::new(stream));

        loop {
            tokio::select! {
                msg = endpoint.recv() => {
                    match msg {
                        None => break,
                        Some((_from, envelope)) => {
                            if Self::dispatch_outbound(&stream, &self.counters, envelope).await {
                                break;
                            }
                        }
                    }
                }
                inbound = Self::read_one(&stream) => {
                    match inbound {
                        Ok((trace, body)) => {
                            Self::dispatch_inbound(&self.bus, &self.name, trace, &body).await;
                        }
                        Err(e) => {
                            warn!(node = %self.name, error = %e, "app connection lost");
                            break;
                        }
                    }
                }
            }
        }

        self.bus.deregister(&self.name);
        let _ = self.bus.try_send(&self.name, "manager", Envelope::new(&self.name, "manager", MessageType::RESP_NODE_UNINIT));
        info!(node = %self.name, "app listener stopped");
    }

    async fn read_one(stream: &Arc<Mutex<TcpStream>>) -> Result<(Option<TraceHeader>, Vec<u8>), FrameError> {
        let mut guard = stream.lock().await;
        read_frame(&mut *guard).await
    }

    /// Returns true when the node should terminate its loop.
    async fn dispatch_outbound(stream: &Arc<Mutex<TcpStream>>, counters: &Arc<DisconnectCounters>, envelope: Envelope) -> bool {
        match envelope.body {
            MessageType::NODE_UNINIT => return true,
            MessageType::TRANS_DATA(data) => {
                let trace = envelope.trace.as_ref().and_then(|hex| decode_trace_ctx(hex));
                match encode_trans_data(&data) {
                    Ok(json) => {
                        let mut guard = stream.lock().await;
                        if let Err(e) = write_frame(&mut *guard, trace, &json).await {
                            warn!(error = %e, "trans-data send failed");
                            counters.record(Duration::from_secs(0));
                        }
                    }
                    Err(e) => warn!(error = %e, "trans-data encode failed"),
                }
            }
            _ => {}
        }
        false
    }

    async fn dispatch_inbound(bus: &Arc<Bus>, name: &str, trace: Option<TraceHeader>, body: &[u8]) {
        let request = match decode_write_request(body) {
            Ok(r) => r,
            Err(e) => {
                warn!(node = %name, error = %e, "write request decode failed");
                return;
            }
        };
        let ctx = trace.map(encode_trace_ctx);
        let (receiver, body) = match request {
            WriteRequest::Single(req) => (req.node_name.clone(), MessageType::WRITE_TAG(req)),
            WriteRequest::Multi(req) => (req.node_name.clone(), MessageType::WRITE_TAGS(req)),
        };
        let mut envelope = Envelope::new(name, &receiver, body);
        if let Some(ctx) = ctx {
            envelope = envelope.with_trace(ctx);
        }
        debug!(node = %name, %receiver, "forwarding write request");
        let _ = bus.try_send(name, &receiver, envelope);
    }
}

/// Hex-encode the 48-byte trace/span id pair as a context string
/// carried with the forwarded write (§4.9 Inbound).
fn encode_trace_ctx(trace: TraceHeader) -> String {
    let mut out = String::with_capacity(48);
    for b in trace.trace_id.iter().chain(trace.span_id.iter()) {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn decode_trace_ctx(hex: &str) -> Option<TraceHeader> {
    if hex.len() != 48 {
        return None;
    }
    let bytes: Vec<u8> = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<_, _>>()
        .ok()?;
    let mut trace_id = [0u8; 16];
    let mut span_id = [0u8; 8];
    trace_id.copy_from_slice(&bytes[0..16]);
    span_id.copy_from_slice(&bytes[16..24]);
    Some(TraceHeader { trace_id, span_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ctx_round_trips() {
        let trace = TraceHeader { trace_id: [1u8; 16], span_id: [2u8; 8] };
        let hex = encode_trace_ctx(trace);
        assert_eq!(hex.len(), 48);
        assert_eq!(decode_trace_ctx(&hex), Some(trace));
    }

    #[test]
    fn disconnect_counters_bucket_by_threshold() {
        let counters = DisconnectCounters::default();
        counters.record(Duration::from_secs(30));
        counters.record(Duration::from_secs(120));
        counters.record(Duration::from_secs(900));
        counters.record(Duration::from_secs(2000));
        assert_eq!(counters.over_60s.load(Ordering::Relaxed), 1);
        assert_eq!(counters.over_600s.load(Ordering::Relaxed), 1);
        assert_eq!(counters.over_1800s.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn accept_and_relay_write_request() {
        let bus = Arc::new(Bus::new());
        let mut manager_ep = bus.register("manager");

        let listener = AppListener::bind("a1", bus.clone(), "127.0.0.1:0").await.unwrap();
        let addr = listener.listener.local_addr().unwrap();
        let handle = tokio::spawn(listener.run());

        let mut peer = TcpStream::connect(addr).await.unwrap();
        let json = br#"{"node_name":"d1","group_name":"g1","tag_name":"t1","value":42}"#;
        write_frame(&mut peer, None, json).await.unwrap();

        let (from, envelope) = manager_ep.recv().await.unwrap();
        assert_eq!(from, "a1");
        assert!(matches!(envelope.body, MessageType::WRITE_TAG(_)));

        bus.try_send("manager", "a1", Envelope::new("manager", "a1", MessageType::NODE_UNINIT)).unwrap();
        handle.await.unwrap();
    }
}
