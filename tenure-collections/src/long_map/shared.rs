use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::{HashLongMap, LongMap};

/// A [`HashLongMap`] readable from many threads without locking.
///
/// Readers load the current snapshot; writers are serialized, mutate a
/// copy-on-write clone and publish it atomically. A reader holding a
/// [`snapshot`](Self::snapshot) keeps seeing that version.
pub struct SharedLongMap<V> {
    current: ArcSwap<HashLongMap<V>>,
    writer: Mutex<()>,
}

impl<V: Clone> SharedLongMap<V> {
    /// Publishes `map` as the initial snapshot.
    pub fn new(map: HashLongMap<V>) -> Self {
        Self {
            current: ArcSwap::from_pointee(map),
            writer: Mutex::new(()),
        }
    }

    /// Current version of the map.
    pub fn snapshot(&self) -> Arc<HashLongMap<V>> {
        self.current.load_full()
    }

    /// Value under `key` in the current version.
    pub fn get(&self, key: i64) -> Option<V> {
        self.current.load().get(key).cloned()
    }

    /// Returns `true` if the current version holds `key`.
    pub fn contains_key(&self, key: i64) -> bool {
        self.current.load().contains_key(key)
    }

    /// Number of keys in the current version.
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Returns `true` if the current version is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `update` to a private copy and publishes the result.
    pub fn update<R>(&self, update: impl FnOnce(&mut HashLongMap<V>) -> R) -> R {
        let _writer = self.writer.lock();
        let mut next = HashLongMap::clone(&self.current.load_full());
        let result = update(&mut next);
        self.current.store(Arc::new(next));
        result
    }
}

impl<V: Clone> Default for SharedLongMap<V> {
    fn default() -> Self {
        Self::new(HashLongMap::create())
    }
}

impl<V: Clone> fmt::Debug for SharedLongMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLongMap")
            .field("map", &self.current.load_full())
            .finish()
    }
}
