use std::sync::Arc;
use std::thread;

use tenure::{CacheLongTable, CostTier, MemoryGovernor, SyntheticInstrumentation};

fn governor() -> (Arc<SyntheticInstrumentation>, MemoryGovernor) {
    let instrumentation =
        Arc::new(SyntheticInstrumentation::new(1_000_000).with_pool("PS Old Gen", None));
    let governor = MemoryGovernor::new(instrumentation.clone());
    (instrumentation, governor)
}

#[test]
fn test_locked_entries_survive_reclamation() {
    let (_, governor) = governor();
    let table = CacheLongTable::new(&governor, "numbers");
    for key in 1..=100 {
        table.put(key, key * 10);
    }
    for key in (2..=100).step_by(2) {
        assert!(table.lock(key));
    }

    assert_eq!(table.free_memory(CostTier::Low), 50);
    governor.gc();
    for key in 1..=100 {
        assert_eq!(table.contains_key(key), key % 2 == 0, "key {key}");
    }

    for key in (2..=100).step_by(2) {
        assert!(table.unlock(key));
    }
    assert_eq!(table.free_memory(CostTier::Low), 50);
    assert!(table.is_empty());
}

#[test]
fn test_governor_drives_eviction_under_pressure() {
    let (instrumentation, governor) = governor();
    let table = CacheLongTable::new(&governor, "quotes");
    table.put(1, "pinned");
    table.put(2, "loose");
    table.lock(1);

    instrumentation.set_heap_used(900_000);
    instrumentation.set_tenured_used(900_000);
    let relief = governor.relieve_pressure().expect("pool is under pressure");
    assert_eq!(relief.handlers_invoked, 1);
    assert_eq!(relief.released, 1);
    assert_eq!(table.get(1), Some("pinned"));
    assert_eq!(table.get(2), None);
}

#[test]
fn test_lock_of_missing_key_is_rejected() {
    let (_, governor) = governor();
    let table = CacheLongTable::<u32>::new(&governor, "empty");
    assert!(!table.lock(5));
    assert!(!table.unlock(5));
    assert!(!table.is_locked(5));
}

#[test]
fn test_replacing_keeps_lock_state() {
    let (_, governor) = governor();
    let table = CacheLongTable::new(&governor, "replace");
    table.put(9, 1);
    table.lock(9);
    assert_eq!(table.put(9, 2), Some(1));
    assert!(table.is_locked(9));
    assert_eq!(table.free_memory(CostTier::High), 0);
    assert_eq!(table.get(9), Some(2));

    // Explicit removal ignores the lock.
    assert_eq!(table.remove(9), Some(2));
    assert!(!table.is_locked(9));
}

#[test]
fn test_threshold_evicts_unlocked_on_insert() {
    let (_, governor) = governor();
    let table = CacheLongTable::new(&governor, "bounded");
    table.set_threshold(3);
    table.put(1, 'a');
    table.lock(1);
    table.put(2, 'b');
    table.put(3, 'c');
    assert_eq!(table.len(), 3);

    table.put(4, 'd');
    assert_eq!(table.len(), 3);
    assert!(table.contains_key(1));
    assert!(table.contains_key(4));

    // Overwrites never evict.
    table.put(4, 'e');
    assert_eq!(table.len(), 3);

    table.set_threshold(0);
    assert_eq!(table.threshold(), None);
    table.put(5, 'f');
    assert_eq!(table.len(), 4);
}

#[test]
fn test_fully_locked_table_grows_past_threshold() {
    let (_, governor) = governor();
    let table = CacheLongTable::new(&governor, "pinned");
    table.set_threshold(2);
    for key in 1..=2 {
        table.put(key, ());
        table.lock(key);
    }
    table.put(3, ());
    assert_eq!(table.len(), 3);
}

#[test]
fn test_shutdown_deregisters() {
    let (_, governor) = governor();
    let table = CacheLongTable::<i64>::new(&governor, "short-lived");
    assert_eq!(governor.handler_count(), 1);
    table.shutdown();
    table.shutdown();
    assert!(table.is_shut_down());
    assert_eq!(governor.handler_count(), 0);

    let dropped = CacheLongTable::<i64>::new(&governor, "dropped");
    assert_eq!(governor.handler_count(), 1);
    drop(dropped);
    assert_eq!(governor.handler_count(), 0);
}

#[test]
fn test_concurrent_lock_and_free() {
    let (_, governor) = governor();
    let table = CacheLongTable::new(&governor, "contended");
    for key in 1..=1_000 {
        table.put(key, key);
    }

    let lockers: Vec<_> = (0..4)
        .map(|worker| {
            let table = table.clone();
            thread::spawn(move || {
                for key in (1..=1_000).filter(|key| key % 4 == worker) {
                    table.lock(key);
                }
            })
        })
        .collect();
    let freer = {
        let table = table.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                table.free_memory(CostTier::MediumLow);
            }
        })
    };
    for handle in lockers {
        handle.join().expect("locker panicked");
    }
    freer.join().expect("freer panicked");

    // Whatever survived is locked; a final pass leaves only locked entries.
    table.free_memory(CostTier::Low);
    for key in 1..=1_000 {
        if table.contains_key(key) {
            assert!(table.is_locked(key));
        }
    }
}
