// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Basic example: export gateway tracing spans to an OTLP collector.
//!
//! Run a local OTLP collector on `localhost:4317` (e.g. Jaeger with OTLP
//! receiver) and then:
//!
//! ```sh
//! cargo run --example otlp_basic
//! ```
//!
//! You should see spans named `driver.read` and `driver.write` appear in
//! the collector UI.

use gateway_tracing::metrics::GatewayMetrics;
use gateway_tracing::{init_tracing, OtlpConfig};

fn main() {
    let config = OtlpConfig {
        endpoint: "http://localhost:4317".to_string(),
        service_name: "gateway-example".to_string(),
        export_traces: true,
        export_metrics: true,
        batch_timeout_ms: 2000,
    };

    let _guard = init_tracing(config).expect("failed to init OTLP tracing");

    let metrics = GatewayMetrics::new();
    simulate_driver_activity(&metrics);

    std::thread::sleep(std::time::Duration::from_secs(3));
    println!("Shutting down OTLP pipeline...");
}

fn simulate_driver_activity(metrics: &GatewayMetrics) {
    for i in 0..5 {
        {
            let _span = tracing::info_span!("driver.read", group = "g1", cycle = i).entered();
            tracing::info!("reading group g1, cycle {i}");
            std::thread::sleep(std::time::Duration::from_millis(10));
            let latency_ns = 10_000_000 + (i as u64 * 500_000);
            metrics.record_read(latency_ns);
        }

        {
            let _span = tracing::info_span!("driver.write", tag = "t1", cycle = i).entered();
            tracing::info!("writing tag t1, cycle {i}");
            std::thread::sleep(std::time::Duration::from_millis(5));
            metrics.record_send(64);
        }
    }
}
