//! Long-keyed cache with pinning, driven by the memory governor.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tenure_collections::{HashLongMap, LongMap};
use tracing::debug;

use crate::governor::{HandlerId, MemoryGovernor, MemoryHandler};
use crate::label::HandlerLabel;
use crate::metrics;
use crate::tier::CostTier;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    locked: bool,
}

struct TableState<V> {
    entries: HashLongMap<Entry<V>>,
    threshold: Option<usize>,
}

impl<V: Clone> TableState<V> {
    /// Evicts up to `limit` unlocked entries; order is unspecified.
    fn evict_unlocked(&mut self, limit: usize) -> usize {
        let victims: Vec<i64> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.locked)
            .map(|(key, _)| key)
            .take(limit)
            .collect();
        for &key in &victims {
            self.entries.remove(key);
        }
        victims.len()
    }
}

/// Cache of values keyed by `i64` whose entries can be pinned.
///
/// The table registers itself with a [`MemoryGovernor`] on construction.
/// Under pressure the governor calls [`free_memory`](Self::free_memory),
/// which evicts every unlocked entry; locked entries are never evicted.
/// Operations on one table are serialized by a single lock.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tenure::{CacheLongTable, CostTier, MemoryGovernor, SyntheticInstrumentation};
///
/// let governor = MemoryGovernor::new(Arc::new(SyntheticInstrumentation::new(1 << 30)));
/// let table = CacheLongTable::new(&governor, "prices");
///
/// table.put(1, 10.5);
/// table.put(2, 11.0);
/// table.lock(1);
///
/// assert_eq!(table.free_memory(CostTier::Low), 1);
/// assert_eq!(table.get(1), Some(10.5));
/// assert_eq!(table.get(2), None);
/// ```
pub struct CacheLongTable<V> {
    label: HandlerLabel,
    governor: MemoryGovernor,
    handler: OnceLock<HandlerId>,
    shut_down: AtomicBool,
    state: Mutex<TableState<V>>,
}

impl<V> CacheLongTable<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty table and registers it with `governor`.
    pub fn new(governor: &MemoryGovernor, label: impl Into<HandlerLabel>) -> Arc<Self> {
        let table = Arc::new(Self {
            label: label.into(),
            governor: governor.clone(),
            handler: OnceLock::new(),
            shut_down: AtomicBool::new(false),
            state: Mutex::new(TableState {
                entries: HashLongMap::create(),
                threshold: None,
            }),
        });
        let id = governor.add_handler(&table);
        let _ = table.handler.set(id);
        table
    }

    /// Table name used in logs and metrics.
    pub fn label(&self) -> &HandlerLabel {
        &self.label
    }

    /// Inserts or replaces the value under `key`, returning the previous
    /// value. Replacing keeps the entry's lock state.
    ///
    /// Inserting a new key into a table at its threshold first evicts
    /// unlocked entries until there is room.
    pub fn put(&self, key: i64, value: V) -> Option<V> {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get(key) {
            let locked = existing.locked;
            return state
                .entries
                .put(key, Entry { value, locked })
                .map(|previous| previous.value);
        }

        if let Some(threshold) = state.threshold
            && state.entries.len() >= threshold
        {
            let excess = state.entries.len() + 1 - threshold;
            let evicted = state.evict_unlocked(excess);
            debug!(cache = %self.label, evicted, threshold, "evicted entries over threshold");
            metrics::record_cache_evictions(&self.label, evicted);
        }

        state.entries.put(
            key,
            Entry {
                value,
                locked: false,
            },
        );
        None
    }

    /// Value under `key`.
    pub fn get(&self, key: i64) -> Option<V> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Returns `true` if `key` is cached.
    pub fn contains_key(&self, key: i64) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Removes `key` whether or not it is locked.
    pub fn remove(&self, key: i64) -> Option<V> {
        self.state
            .lock()
            .entries
            .remove(key)
            .map(|entry| entry.value)
    }

    /// Pins `key` against eviction. Returns `false` if the key is absent.
    pub fn lock(&self, key: i64) -> bool {
        self.set_locked(key, true)
    }

    /// Unpins `key`. Returns `false` if the key is absent.
    pub fn unlock(&self, key: i64) -> bool {
        self.set_locked(key, false)
    }

    fn set_locked(&self, key: i64, locked: bool) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get(key) else {
            return false;
        };
        if entry.locked != locked {
            let value = entry.value.clone();
            state.entries.put(key, Entry { value, locked });
        }
        true
    }

    /// Returns `true` if `key` is cached and pinned.
    pub fn is_locked(&self, key: i64) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.locked)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry cap enforced on insert, if any.
    pub fn threshold(&self) -> Option<usize> {
        self.state.lock().threshold
    }

    /// Caps the entry count at `threshold`; zero removes the cap. Existing
    /// entries are only trimmed by later inserts.
    pub fn set_threshold(&self, threshold: usize) {
        self.state.lock().threshold = (threshold > 0).then_some(threshold);
    }

    /// Drops every entry, locked or not.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Evicts every unlocked entry and returns how many were evicted.
    ///
    /// Every tier evicts all unlocked entries; the table keeps no recency
    /// information to rank victims by.
    pub fn free_memory(&self, tier: CostTier) -> usize {
        let evicted = self.state.lock().evict_unlocked(usize::MAX);
        debug!(cache = %self.label, %tier, evicted, "freed cache table memory");
        metrics::record_cache_evictions(&self.label, evicted);
        evicted
    }

    /// Deregisters from the governor. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(&id) = self.handler.get() {
            self.governor.remove_handler(id);
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl<V> MemoryHandler for CacheLongTable<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn free_memory(&self, tier: CostTier) -> usize {
        CacheLongTable::free_memory(self, tier)
    }

    fn label(&self) -> HandlerLabel {
        self.label.clone()
    }
}

impl<V> Drop for CacheLongTable<V> {
    fn drop(&mut self) {
        if !self.shut_down.swap(true, Ordering::AcqRel)
            && let Some(&id) = self.handler.get()
        {
            self.governor.remove_handler(id);
        }
    }
}

impl<V: Clone> fmt::Debug for CacheLongTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CacheLongTable")
            .field("label", &self.label)
            .field("len", &state.entries.len())
            .field("version", &state.entries.version())
            .field("threshold", &state.threshold)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}
