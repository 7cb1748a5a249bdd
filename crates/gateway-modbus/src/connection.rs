// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Modbus TCP client connection.
//!
//! A synchronous `Mutex<TcpStream>` with connect/read/write timeouts
//! and primary/backup failover, rather than an async socket — the
//! driver's per-node work runs on a blocking thread (§5 concurrency
//! model), unlike the rest of the runtime which is tokio-task based.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ModbusError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// One TCP connection, with an optional backup endpoint. After the
/// first failure on the primary, failover to the backup; after a
/// subsequent failure on the backup, failover back (§4.8 Connection
/// model: alternate on consecutive disconnects).
pub struct Connection {
    primary: SocketAddr,
    backup: Option<SocketAddr>,
    using_backup: AtomicBool,
    stream: Mutex<Option<TcpStream>>,
}

impl Connection {
    pub fn new(primary: SocketAddr, backup: Option<SocketAddr>) -> Self {
        Self { primary, backup, using_backup: AtomicBool::new(false), stream: Mutex::new(None) }
    }

    fn current_target(&self) -> SocketAddr {
        if self.using_backup.load(Ordering::Relaxed) {
            self.backup.unwrap_or(self.primary)
        } else {
            self.primary
        }
    }

    fn connect(&self) -> Result<TcpStream, ModbusError> {
        let target = self.current_target();
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(stream)
    }

    /// Send `frame` and read back up to `max_response` bytes, or signal
    /// disconnection (triggering failover to the alternate endpoint on
    /// the next call).
    pub fn transact(&self, frame: &[u8], max_response: usize) -> Result<Vec<u8>, ModbusError> {
        let mut guard = self.stream.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let stream = guard.as_mut().unwrap();

        let result = (|| -> Result<Vec<u8>, ModbusError> {
            stream.write_all(frame)?;
            let mut buf = vec![0u8; max_response];
            let n = stream.read(&mut buf)?;
            if n == 0 {
                return Err(ModbusError::Disconnected);
            }
            buf.truncate(n);
            Ok(buf)
        })();

        if result.is_err() {
            *guard = None;
            drop(guard);
            self.toggle_backup();
        }
        result
    }

    fn toggle_backup(&self) {
        if self.backup.is_some() {
            self.using_backup.fetch_xor(true, Ordering::Relaxed);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.lock().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn transact_round_trips_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8];
            let n = sock.read(&mut buf).unwrap();
            sock.write_all(&buf[..n]).unwrap();
        });

        let conn = Connection::new(addr, None);
        let resp = conn.transact(&[1, 2, 3], 16).unwrap();
        assert_eq!(resp, vec![1, 2, 3]);
        handle.join().unwrap();
    }

    #[test]
    fn failed_connect_surfaces_as_disconnected() {
        let conn = Connection::new("127.0.0.1:1".parse().unwrap(), None);
        assert!(conn.transact(&[1], 8).is_err());
    }
}
