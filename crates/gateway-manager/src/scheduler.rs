// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Driver scheduler (C7).
//!
//! One `tokio::spawn`ed task per driver group, ticking on an interval
//! and handed off to a `SchedulerHandle` (`Arc<AtomicBool>` running
//! flag with `is_running()`/`stop()`) the caller uses to tear it down.

use gateway_core::bus::Bus;
use gateway_core::message::{Envelope, MessageType, TransData};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a driver does on one scheduler tick: run its protocol turn for
/// `group` and return the resulting trans-data. Implemented by
/// `gateway-modbus`'s driver facade; kept as a boxed-future trait
/// object here rather than pulling in an async-trait dependency the
/// corpus does not otherwise use.
pub trait GroupReader: Send + Sync {
    fn read_group(&self, group: String) -> Pin<Box<dyn Future<Output = TransData> + Send>>;
}

/// Handle to a running per-group timer task.
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

pub struct GroupScheduler;

impl GroupScheduler {
    /// Spawn the periodic timer for one `(driver, group)`. Fires every
    /// `interval_ms` while `running` stays true; stops immediately if
    /// the node is not `running` (checked by the caller before spawn,
    /// and again via `SchedulerHandle::stop`).
    pub fn spawn(
        bus: Arc<Bus>,
        driver: String,
        group: String,
        interval_ms: u64,
        reader: Arc<dyn GroupReader>,
    ) -> SchedulerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let running_task = running.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            while running_task.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running_task.load(Ordering::SeqCst) {
                    break;
                }
                let data = reader.read_group(group.clone()).await;
                let envelope = Envelope::new(&driver, "manager", MessageType::TRANS_DATA(data));
                if let Err(e) = bus.try_send(&driver, "manager", envelope) {
                    warn!(error = %e, %driver, %group, "failed to publish trans-data");
                } else {
                    debug!(%driver, %group, "published trans-data");
                }
            }
        });
        SchedulerHandle { running, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::message::TagSample;

    struct FixedReader;
    impl GroupReader for FixedReader {
        fn read_group(&self, group: String) -> Pin<Box<dyn Future<Output = TransData> + Send>> {
            Box::pin(async move {
                TransData {
                    driver: "d1".to_string(),
                    group,
                    timestamp_ms: 0,
                    samples: vec![TagSample { tag: "t1".to_string(), value: None, error: None, metas: Default::default() }],
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_publishes_on_each_tick() {
        let bus = Arc::new(Bus::new());
        let mut manager_ep = bus.register("manager");
        let handle = GroupScheduler::spawn(bus.clone(), "d1".to_string(), "g1".to_string(), 10, Arc::new(FixedReader));

        tokio::time::advance(Duration::from_millis(25)).await;
        let (_from, env) = manager_ep.recv().await.unwrap();
        assert!(matches!(env.body, MessageType::TRANS_DATA(_)));

        handle.stop();
        handle.join().await;
    }
}
