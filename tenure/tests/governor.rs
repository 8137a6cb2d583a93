use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tenure::{
    CollectorDefaults, CollectorFamily, CostTier, HandlerLabel, MemoryConfig, MemoryGovernor,
    MemoryHandler, MemoryZone, SyntheticInstrumentation,
};

const GIB: u64 = 1 << 30;

fn g1(physical: u64) -> (Arc<SyntheticInstrumentation>, MemoryGovernor) {
    let instrumentation = Arc::new(SyntheticInstrumentation::new(physical).with_pool(
        "G1 Old Gen",
        Some(physical / 4 * 3),
    ));
    let governor = MemoryGovernor::new(instrumentation.clone());
    (instrumentation, governor)
}

fn pressure(instrumentation: &SyntheticInstrumentation, bytes: u64) {
    instrumentation.set_heap_used(bytes);
    instrumentation.set_tenured_used(bytes);
}

/// Records the order it was invoked in and optionally relieves pressure.
struct RecordingHandler {
    name: &'static str,
    log: Arc<Mutex<Vec<(&'static str, CostTier)>>>,
    relieve: Option<(Arc<SyntheticInstrumentation>, u64)>,
}

impl MemoryHandler for RecordingHandler {
    fn free_memory(&self, tier: CostTier) -> usize {
        self.log.lock().push((self.name, tier));
        if let Some((instrumentation, bytes)) = &self.relieve {
            pressure(instrumentation, *bytes);
        }
        1
    }

    fn label(&self) -> HandlerLabel {
        HandlerLabel::new_static(self.name)
    }
}

#[test]
fn test_tenured_total_never_exceeds_total() {
    let (_, governor) = g1(8 * GIB);
    assert_eq!(governor.total_memory(), 8 * GIB);
    assert_eq!(governor.tenured_total_memory(), 6 * GIB);

    assert_eq!(governor.set_tenured_size(Some(20 * GIB)), 8 * GIB);
    assert_eq!(governor.set_max_memory(4 * GIB), 4 * GIB);
    assert_eq!(governor.tenured_total_memory(), 4 * GIB);
    assert!(governor.calculated_tenured_threshold() <= governor.tenured_total_memory());
}

#[test]
fn test_tenured_size_below_max_memory_is_exact() {
    let (_, governor) = g1(8 * GIB);
    assert_eq!(governor.set_max_memory(4 * GIB), 4 * GIB);
    assert_eq!(governor.set_tenured_size(Some(GIB)), GIB);
    assert_eq!(governor.tenured_total_memory(), GIB);
    assert_eq!(governor.total_memory(), 4 * GIB);
    assert!(governor.calculated_tenured_threshold() <= GIB);
}

#[test]
fn test_readings_follow_instrumentation_after_zone_check() {
    let (instrumentation, governor) = g1(8 * GIB);
    instrumentation.set_physical_max(2 * GIB);
    assert_eq!(governor.total_memory(), 8 * GIB);

    governor.check_zone();
    assert_eq!(governor.total_memory(), 2 * GIB);
    assert_eq!(governor.tenured_total_memory(), 2 * GIB);
    assert!(governor.calculated_tenured_threshold() <= 2 * GIB);
    assert_eq!(governor.calculated_tenured_threshold(), governor.threshold());
}

#[test]
fn test_max_memory_is_clamped_to_physical() {
    let (_, governor) = g1(2 * GIB);
    assert_eq!(governor.set_max_memory(64 * GIB), 2 * GIB);
    assert_eq!(governor.set_max_memory(0), 2 * GIB);
}

#[test]
fn test_tenured_percent_is_share_of_total() {
    let (_, governor) = g1(1_000_000);
    assert_eq!(governor.set_tenured_percent(Some(40)), 400_000);
    assert_eq!(governor.set_tenured_percent(Some(200)), 1_000_000);
    assert_eq!(governor.set_tenured_percent(None), 750_000);
}

#[test]
fn test_threshold_follows_collector_family() {
    let (instrumentation, governor) = g1(1_000_000);
    assert_eq!(governor.collector_family(), CollectorFamily::G1);
    // 85% of 750_000 minus a 10% reserve.
    assert_eq!(governor.threshold(), 7_500 * 85 - 7_500 * 10);
    assert_eq!(instrumentation.published_threshold(), governor.threshold());

    let threshold = governor.set_collector_defaults(Some(CollectorDefaults::new(50, 0)));
    assert_eq!(threshold, 375_000);
    assert_eq!(instrumentation.published_threshold(), 375_000);
}

#[test]
fn test_zone_switches_at_threshold() {
    let (instrumentation, governor) = g1(1_000_000);
    let threshold = governor.threshold();

    pressure(&instrumentation, threshold - 1);
    assert_eq!(governor.check_zone(), MemoryZone::Normal);
    assert_eq!(governor.pressure_tier(), CostTier::Low);

    pressure(&instrumentation, threshold);
    assert_eq!(governor.check_zone(), MemoryZone::Pressure);

    pressure(&instrumentation, governor.tenured_total_memory());
    assert_eq!(governor.pressure_tier(), CostTier::High);
}

#[test]
fn test_snapshot_is_consistent() {
    let (instrumentation, governor) = g1(1_000_000);
    instrumentation.set_heap_used(300_000);
    instrumentation.set_tenured_used(200_000);

    let snapshot = governor.snapshot();
    assert_eq!(snapshot.total, 1_000_000);
    assert_eq!(snapshot.free, 700_000);
    assert_eq!(snapshot.tenured_free, 550_000);
    assert_eq!(snapshot.zone, MemoryZone::Normal);
    assert_eq!(snapshot.collector, CollectorFamily::G1);
}

#[test]
fn test_clear_memory_runs_handlers_in_order_until_relieved() {
    let (instrumentation, governor) = g1(1_000_000);
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::new(RecordingHandler {
        name: "first",
        log: log.clone(),
        relieve: None,
    });
    let second = Arc::new(RecordingHandler {
        name: "second",
        log: log.clone(),
        relieve: Some((instrumentation.clone(), 0)),
    });
    let third = Arc::new(RecordingHandler {
        name: "third",
        log: log.clone(),
        relieve: None,
    });
    governor.add_handler(&first);
    governor.add_handler(&second);
    governor.add_handler(&third);

    pressure(&instrumentation, 900_000);
    let relief = governor.clear_memory(CostTier::MediumLow);
    assert_eq!(relief.handlers_invoked, 2);
    assert_eq!(
        *log.lock(),
        vec![("first", CostTier::MediumLow), ("second", CostTier::MediumLow)]
    );

    // Without pressure every handler runs.
    log.lock().clear();
    let relief = governor.clear_memory(CostTier::Low);
    assert_eq!(relief.handlers_invoked, 3);
    assert_eq!(relief.released, 3);
}

#[test]
fn test_relieve_pressure_is_idle_without_pressure() {
    let (_, governor) = g1(1_000_000);
    let calls = Arc::new(AtomicUsize::new(0));

    struct Counting(Arc<AtomicUsize>);
    impl MemoryHandler for Counting {
        fn free_memory(&self, _tier: CostTier) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    let handler = Arc::new(Counting(calls.clone()));
    governor.add_handler(&handler);
    assert!(governor.relieve_pressure().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dropped_handlers_are_pruned() {
    let (_, governor) = g1(1_000_000);
    let log = Arc::new(Mutex::new(Vec::new()));
    let kept = Arc::new(RecordingHandler {
        name: "kept",
        log: log.clone(),
        relieve: None,
    });
    let dropped = Arc::new(RecordingHandler {
        name: "dropped",
        log: log.clone(),
        relieve: None,
    });
    governor.add_handler(&kept);
    let id = governor.add_handler(&dropped);
    assert_eq!(governor.handler_count(), 2);

    drop(dropped);
    assert_eq!(governor.handler_count(), 1);
    assert!(!governor.remove_handler(id));

    governor.clear_memory(CostTier::Low);
    assert_eq!(*log.lock(), vec![("kept", CostTier::Low)]);
}

#[test]
fn test_gc_is_forwarded_and_counted() {
    let (instrumentation, governor) = g1(GIB);
    governor.gc();
    governor.gc();
    assert_eq!(governor.gc_count(), 2);
    assert_eq!(instrumentation.collection_requests(), 2);
}

#[test]
fn test_clones_share_state() {
    let (_, governor) = g1(GIB);
    let clone = governor.clone();
    clone.set_max_memory(GIB / 2);
    assert_eq!(governor.total_memory(), GIB / 2);
}

#[test]
fn test_with_config_applies_and_validates() {
    let instrumentation = Arc::new(SyntheticInstrumentation::new(1_000_000));
    let config = MemoryConfig::builder()
        .max_memory(800_000)
        .tenured_percent(50)
        .collector(CollectorDefaults::new(90, 10))
        .build();

    let governor = MemoryGovernor::with_config(instrumentation.clone(), &config)
        .expect("config is consistent");
    assert_eq!(governor.total_memory(), 800_000);
    assert_eq!(governor.tenured_total_memory(), 400_000);
    assert_eq!(governor.threshold(), 320_000);

    let conflicting = MemoryConfig::builder()
        .tenured_size(1)
        .tenured_percent(1)
        .build();
    assert!(MemoryGovernor::with_config(instrumentation, &conflicting).is_err());
}

#[test]
fn test_without_pool_whole_heap_is_tenured() {
    let instrumentation = Arc::new(SyntheticInstrumentation::new(1_000_000));
    let governor = MemoryGovernor::new(instrumentation.clone());
    assert_eq!(governor.collector_family(), CollectorFamily::Process);
    assert_eq!(governor.tenured_total_memory(), 1_000_000);

    instrumentation.set_heap_used(750_000);
    assert_eq!(governor.tenured_used(), 750_000);
    assert_eq!(governor.check_zone(), MemoryZone::Pressure);
}
