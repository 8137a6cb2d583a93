//! Tests for verifying metrics correctness.

#![cfg(feature = "metrics")]

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::{CompositeKey, MetricKind};
use tenure::{CacheLongTable, CostTier, MemoryGovernor, SyntheticInstrumentation};

type SnapshotEntry = (
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
);

/// Find a counter in entries by name and one label.
fn find_counter(entries: &[SnapshotEntry], name: &str, label: (&str, &str)) -> Option<u64> {
    entries.iter().find_map(|(key, _, _, value)| {
        let matches = key.kind() == MetricKind::Counter
            && key.key().name() == name
            && key
                .key()
                .labels()
                .any(|l| l.key() == label.0 && l.value() == label.1);
        match (matches, value) {
            (true, DebugValue::Counter(v)) => Some(*v),
            _ => None,
        }
    })
}

fn find_gauge(entries: &[SnapshotEntry], name: &str) -> Option<f64> {
    entries.iter().find_map(|(key, _, _, value)| {
        match (key.kind() == MetricKind::Gauge && key.key().name() == name, value) {
            (true, DebugValue::Gauge(v)) => Some(v.into_inner()),
            _ => None,
        }
    })
}

#[test]
fn test_zone_check_records_readings() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let instrumentation =
            Arc::new(SyntheticInstrumentation::new(1_000_000).with_pool("G1 Old Gen", None));
        instrumentation.set_heap_used(100_000);
        instrumentation.set_tenured_used(100_000);
        let governor = MemoryGovernor::new(instrumentation);
        governor.gc();
    });

    let entries = snapshotter.snapshot().into_vec();
    assert_eq!(
        find_gauge(&entries, "tenure_memory_threshold_bytes"),
        Some(750_000.0)
    );
    assert_eq!(
        find_gauge(&entries, "tenure_memory_tenured_used_bytes"),
        Some(100_000.0)
    );
    let gc = entries.iter().find_map(|(key, _, _, value)| {
        match (key.key().name() == "tenure_memory_gc_requests_total", value) {
            (true, DebugValue::Counter(v)) => Some(*v),
            _ => None,
        }
    });
    assert_eq!(gc, Some(1));
}

#[test]
fn test_handler_invocations_and_evictions_are_labelled() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let governor = MemoryGovernor::new(Arc::new(SyntheticInstrumentation::new(1 << 20)));
        let table = CacheLongTable::new(&governor, "orders");
        for key in 1..=5 {
            table.put(key, key);
        }
        table.lock(1);
        governor.clear_memory(CostTier::MediumLow);
    });

    let entries = snapshotter.snapshot().into_vec();
    assert_eq!(
        find_counter(&entries, "tenure_cache_evictions_total", ("cache", "orders")),
        Some(4)
    );
    assert_eq!(
        find_counter(
            &entries,
            "tenure_memory_handler_invocations_total",
            ("tier", "medium_low")
        ),
        Some(1)
    );
}
