use std::collections::HashMap;
use std::sync::Arc;

use super::key_data::{KeyCache, KeyData};
use super::{BRIEF_KEY_LIMIT, KeyState, LongMap, LongMapIter, MapOptions, normalize_keys};
use crate::error::CollectionResult;

/// Long map that is a hash table from the first write.
///
/// The table sits behind an `Arc`, so cloning is O(1) and the clone is a
/// snapshot; the first write on either side copies the table.
#[derive(Debug, Clone)]
pub struct EagerLongMap<V> {
    table: Arc<HashMap<i64, V>>,
    keys: KeyCache,
    options: Arc<MapOptions>,
}

impl<V: Clone> EagerLongMap<V> {
    /// Creates an empty map with default tuning.
    pub fn new() -> Self {
        Self::with_options(Arc::new(MapOptions::default()))
    }

    pub(crate) fn with_options(options: Arc<MapOptions>) -> Self {
        let mut keys = KeyCache::default();
        keys.reset_empty();
        Self {
            table: Arc::new(HashMap::new()),
            keys,
            options,
        }
    }

    fn collect_keys(&self) -> Vec<i64> {
        self.table.keys().copied().collect()
    }
}

impl<V: Clone> Default for EagerLongMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> LongMap<V> for EagerLongMap<V> {
    fn len(&self) -> usize {
        self.table.len()
    }

    fn get(&self, key: i64) -> Option<&V> {
        self.table.get(&key)
    }

    fn put(&mut self, key: i64, value: V) -> Option<V> {
        let previous = Arc::make_mut(&mut self.table).insert(key, value);
        if previous.is_none() {
            self.keys.invalidate();
        }
        previous
    }

    fn put_multi_rows(
        &mut self,
        keys: Vec<i64>,
        value: V,
        state: KeyState,
    ) -> CollectionResult<()> {
        let keys = normalize_keys(keys, state, self.options.validate_hints)?;
        if keys.is_empty() {
            return Ok(());
        }
        let table = Arc::make_mut(&mut self.table);
        table.reserve(keys.len());
        let mut added = false;
        for key in keys {
            added |= table.insert(key, value.clone()).is_none();
        }
        if added {
            self.keys.invalidate();
        }
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Option<V> {
        if !self.table.contains_key(&key) {
            return None;
        }
        let removed = Arc::make_mut(&mut self.table).remove(&key);
        self.keys.invalidate();
        removed
    }

    fn clear(&mut self) {
        self.table = Arc::new(HashMap::new());
        self.keys.reset_empty();
    }

    fn key_array(&self) -> Vec<i64> {
        match self.keys.sorted() {
            Some(sorted) => sorted.to_vec(),
            None => self.collect_keys(),
        }
    }

    fn sorted_key_array(&self) -> Arc<[i64]> {
        self.keys.sorted_or_init(|| {
            let mut keys = self.collect_keys();
            keys.sort_unstable();
            keys.into()
        })
    }

    fn brief_key_array(&self) -> Vec<i64> {
        self.table.keys().take(BRIEF_KEY_LIMIT).copied().collect()
    }

    fn key_data(&self) -> Arc<KeyData> {
        self.keys
            .data_or_init(|| KeyData::from_keys(self.key_array(), &self.options))
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn is_key_array_sorted(&self) -> bool {
        self.table.len() <= 1 || self.keys.sorted().is_some()
    }

    fn iter(&self) -> LongMapIter<'_, V> {
        Box::new(self.table.iter().map(|(&key, value)| (key, value)))
    }
}
