use std::sync::Arc;
use std::time::Duration;

use tenure::{CacheLongTable, MemoryGovernor, SyntheticInstrumentation};

fn setup() -> (
    Arc<SyntheticInstrumentation>,
    MemoryGovernor,
    Arc<CacheLongTable<u64>>,
) {
    let instrumentation =
        Arc::new(SyntheticInstrumentation::new(1_000_000).with_pool("Tenured Gen", None));
    let governor = MemoryGovernor::new(instrumentation.clone());
    governor.set_monitor_interval(Duration::from_millis(100));
    let table = CacheLongTable::new(&governor, "monitored");
    for key in 1..=10 {
        table.put(key, key as u64);
    }
    (instrumentation, governor, table)
}

#[tokio::test(start_paused = true)]
async fn test_monitor_relieves_pressure_on_tick() {
    let (instrumentation, governor, table) = setup();
    let monitor = governor.spawn_monitor();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(table.len(), 10);

    instrumentation.set_heap_used(950_000);
    instrumentation.set_tenured_used(950_000);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(table.is_empty());
    assert!(!monitor.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_stopped_monitor_does_nothing() {
    let (instrumentation, governor, table) = setup();
    let monitor = governor.spawn_monitor();
    tokio::time::sleep(Duration::from_millis(50)).await;

    monitor.stop();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(monitor.is_finished());

    instrumentation.set_heap_used(950_000);
    instrumentation.set_tenured_used(950_000);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(table.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_monitor() {
    let (instrumentation, governor, table) = setup();
    drop(governor.spawn_monitor());

    instrumentation.set_heap_used(950_000);
    instrumentation.set_tenured_used(950_000);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(table.len(), 10);
}
