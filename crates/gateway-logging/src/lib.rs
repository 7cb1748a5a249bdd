// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ambient logging (§9).
//!
//! Process-wide `tracing`/`tracing-subscriber` initialization plus a
//! runtime-adjustable level: the `reload::Handle` that the
//! `UPDATE_LOG_LEVEL` message mutates.
//!
//! ```no_run
//! gateway_logging::init(gateway_logging::LogLevel::Info);
//! gateway_logging::set_global_level("debug");
//! ```

pub mod level;

pub use level::LogLevel;

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type LevelHandle = reload::Handle<EnvFilter, Registry>;

static LEVEL_HANDLE: OnceLock<LevelHandle> = OnceLock::new();

/// Installs the global `tracing` subscriber with a reloadable
/// `EnvFilter` seeded at `initial`. Call once, at process start.
pub fn init(initial: LogLevel) {
    let filter = EnvFilter::new(initial.as_filter_directive());
    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false))
        .init();

    let _ = LEVEL_HANDLE.set(handle);
}

/// Updates the process-wide log level. Backs the `UPDATE_LOG_LEVEL`
/// message. No-op if `level` doesn't parse or `init` was never called.
pub fn set_global_level(level: &str) {
    let Some(parsed) = LogLevel::parse(level) else {
        tracing::warn!(level, "unknown log level in UPDATE_LOG_LEVEL, ignoring");
        return;
    };

    let Some(handle) = LEVEL_HANDLE.get() else {
        tracing::warn!("set_global_level called before init, ignoring");
        return;
    };

    if let Err(err) = handle.modify(|filter| *filter = EnvFilter::new(parsed.as_filter_directive()))
    {
        tracing::warn!(%err, "failed to apply reloaded log level");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_global_level_before_init_does_not_panic() {
        set_global_level("debug");
    }

    #[test]
    fn set_global_level_rejects_unknown_level() {
        set_global_level("not-a-level");
    }
}
