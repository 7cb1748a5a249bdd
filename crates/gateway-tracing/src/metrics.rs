// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway metric instruments.
//!
//! [`GatewayMetrics`] wraps the OpenTelemetry counters and histograms
//! the app core and driver core emit: send/receive byte and message
//! counters for the eKuiper pair-socket (§4.9 step 4), and a read
//! latency histogram for driver commands.
//!
//! # Usage
//!
//! ```no_run
//! use gateway_tracing::metrics::GatewayMetrics;
//!
//! let m = GatewayMetrics::new();
//! m.record_send(128);
//! m.record_send_error();
//! m.record_read(4_200);
//! ```

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::global;

/// Pre-built gateway metric instruments.
///
/// Create one instance per component and call the `record_*` methods
/// to emit measurements. The underlying instruments are obtained from
/// the global `MeterProvider`, so [`crate::init_tracing`] (with
/// `export_metrics = true`) must be called first.
pub struct GatewayMetrics {
    send_msgs_total: Counter<u64>,
    send_bytes_total: Counter<u64>,
    send_msg_errors_total: Counter<u64>,
    read_latency_ns: Histogram<u64>,
}

impl GatewayMetrics {
    /// Create a new set of gateway metric instruments from the global meter.
    pub fn new() -> Self {
        let meter: Meter = global::meter("gateway");
        Self::from_meter(&meter)
    }

    /// Create instruments from an explicit [`Meter`].
    pub fn from_meter(meter: &Meter) -> Self {
        let send_msgs_total = meter
            .u64_counter("gateway.send.msgs_total")
            .with_description("Total trans-data frames sent to app nodes")
            .build();

        let send_bytes_total = meter
            .u64_counter("gateway.send.bytes_total")
            .with_description("Total trans-data bytes sent to app nodes")
            .build();

        let send_msg_errors_total = meter
            .u64_counter("gateway.send.msg_errors_total")
            .with_description("Trans-data frames that failed to send")
            .build();

        let read_latency_ns = meter
            .u64_histogram("gateway.driver.read_latency_ns")
            .with_description("Driver command round-trip latency in nanoseconds")
            .build();

        Self { send_msgs_total, send_bytes_total, send_msg_errors_total, read_latency_ns }
    }

    /// Record a successful trans-data send of `bytes` length.
    pub fn record_send(&self, bytes: u64) {
        self.send_msgs_total.add(1, &[]);
        self.send_bytes_total.add(bytes, &[]);
    }

    /// Record a trans-data send failure.
    pub fn record_send_error(&self) {
        self.send_msg_errors_total.add(1, &[]);
    }

    /// Record a driver command round trip with the given latency in
    /// nanoseconds.
    pub fn record_read(&self, latency_ns: u64) {
        self.read_latency_ns.record(latency_ns, &[]);
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
