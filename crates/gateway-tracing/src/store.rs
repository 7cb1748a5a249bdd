// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide trace-context store (§4.10).
//!
//! Nodes address a trace by the opaque `ctx` handle carried in
//! [`gateway_core::message::Envelope`]. `open` creates the root
//! `tracing::Span` for a trace; `add_span` creates a child span under
//! it; the `set_*` methods record fields that were declared empty at
//! creation time. Every span is a real `tracing::Span`, so when an
//! `OpenTelemetryLayer` is installed (see [`crate::init_tracing`]) it
//! is exported with correct lineage; when it is not, creation and
//! `record` calls cost only a level-filter check — tracing's own
//! mechanism for a disabled span, with no separate flag in this store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanHandle(u64);

struct TraceEntry {
    root: Span,
}

struct SpanEntry {
    span: Span,
    trace: TraceHandle,
}

/// Opaque-handle-keyed store of in-flight traces and their spans.
#[derive(Default)]
pub struct TraceStore {
    traces: Mutex<HashMap<u64, TraceEntry>>,
    spans: Mutex<HashMap<u64, SpanEntry>>,
    next: AtomicU64,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new trace rooted at `name`, returning its handle.
    pub fn open(&self, name: &str) -> TraceHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let root = tracing::info_span!("trace", name = %name, trace_id = id);
        self.traces.lock().unwrap().insert(id, TraceEntry { root });
        TraceHandle(id)
    }

    /// Look up a trace by handle. Returns `None` once the trace has
    /// been finalized or if it never existed.
    pub fn find(&self, handle: TraceHandle) -> Option<TraceHandle> {
        self.traces.lock().unwrap().contains_key(&handle.0).then_some(handle)
    }

    /// Create a child span named `name` under `trace`. Returns `None`
    /// if the trace is unknown (already finalized or never opened).
    pub fn add_span(&self, trace: TraceHandle, name: &str) -> Option<SpanHandle> {
        let span = {
            let traces = self.traces.lock().unwrap();
            let entry = traces.get(&trace.0)?;
            let _enter = entry.root.enter();
            tracing::info_span!(
                "span",
                name = %name,
                parent_span_id = tracing::field::Empty,
                start_ms = tracing::field::Empty,
                end_ms = tracing::field::Empty,
                status = tracing::field::Empty,
            )
        };
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.spans.lock().unwrap().insert(id, SpanEntry { span, trace });
        Some(SpanHandle(id))
    }

    pub fn set_parent_span_id(&self, span: SpanHandle, parent_span_id: &str) {
        self.with_span(span, |s| s.record("parent_span_id", parent_span_id));
    }

    pub fn set_start(&self, span: SpanHandle, start_ms: i64) {
        self.with_span(span, |s| s.record("start_ms", start_ms));
    }

    pub fn set_end_time(&self, span: SpanHandle, end_ms: i64) {
        self.with_span(span, |s| s.record("end_ms", end_ms));
    }

    pub fn set_status(&self, span: SpanHandle, status: &str) {
        self.with_span(span, |s| s.record("status", status));
    }

    /// Mark `trace` complete, dropping it and every span created under
    /// it. Subsequent `find`/`add_span` calls for this handle fail.
    pub fn set_final(&self, trace: TraceHandle) {
        self.traces.lock().unwrap().remove(&trace.0);
        self.spans.lock().unwrap().retain(|_, entry| entry.trace != trace);
    }

    fn with_span(&self, span: SpanHandle, f: impl FnOnce(&Span)) {
        if let Some(entry) = self.spans.lock().unwrap().get(&span.0) {
            f(&entry.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_handle_while_trace_is_open() {
        let store = TraceStore::new();
        let trace = store.open("write_round_trip");
        assert_eq!(store.find(trace), Some(trace));
    }

    #[test]
    fn add_span_fails_for_unknown_trace() {
        let store = TraceStore::new();
        let ghost = store.open("x");
        store.set_final(ghost);
        assert!(store.add_span(ghost, "driver_cmd_send").is_none());
    }

    #[test]
    fn set_final_drops_trace_and_its_spans() {
        let store = TraceStore::new();
        let trace = store.open("write_round_trip");
        let span = store.add_span(trace, "driver_cmd_send").unwrap();
        store.set_parent_span_id(span, "0102030405060708");
        store.set_status(span, "SUCCESS");

        store.set_final(trace);
        assert!(store.find(trace).is_none());
        assert!(store.spans.lock().unwrap().is_empty());
    }
}
