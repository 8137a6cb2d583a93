//! Dual-mode long map: lazy sorted rows until scattered writes pile up.

use std::collections::HashMap;
use std::iter::Peekable;
use std::sync::Arc;

use tracing::debug;

use super::key_data::{KeyCache, KeyData};
use super::{BRIEF_KEY_LIMIT, KeyState, LongMap, LongMapIter, MapOptions, normalize_keys};
use crate::error::CollectionResult;
use crate::long_array::{LargeLongArray, chunk_values};

#[derive(Debug, Clone)]
enum Pending<V> {
    Put(V),
    Removed,
}

#[derive(Debug, Clone)]
enum BaseValues<V> {
    /// One value shared by every base key.
    Uniform(V),
    /// Value per base key, indexed by rank.
    Dense(Arc<Vec<V>>),
}

/// Sorted, gap-free base keys plus a small overlay of scattered writes.
///
/// Key zero never enters the base and lives in the overlay.
#[derive(Debug, Clone)]
struct LazyRows<V> {
    base: LargeLongArray,
    values: BaseValues<V>,
    overlay: HashMap<i64, Pending<V>>,
}

impl<V: Clone> LazyRows<V> {
    fn empty(options: &MapOptions) -> Self {
        Self {
            base: LargeLongArray::from_sorted_chunks(
                Vec::new(),
                Arc::clone(&options.array_options),
            ),
            values: BaseValues::Dense(Arc::new(Vec::new())),
            overlay: HashMap::new(),
        }
    }

    /// Rows for ascending, unique `keys` all mapped to `value`.
    fn bulk(mut keys: Vec<i64>, value: V, options: &MapOptions) -> CollectionResult<Self> {
        let mut overlay = HashMap::new();
        if let Ok(position) = keys.binary_search(&0) {
            keys.remove(position);
            overlay.insert(0, Pending::Put(value.clone()));
        }
        let chunks = chunk_values(keys, &options.array_options)?;
        Ok(Self {
            base: LargeLongArray::from_sorted_chunks(chunks, Arc::clone(&options.array_options)),
            values: BaseValues::Uniform(value),
            overlay,
        })
    }

    fn base_value(&self, rank: usize) -> &V {
        match &self.values {
            BaseValues::Uniform(value) => value,
            BaseValues::Dense(values) => &values[rank],
        }
    }

    fn get(&self, key: i64) -> Option<&V> {
        match self.overlay.get(&key) {
            Some(Pending::Put(value)) => Some(value),
            Some(Pending::Removed) => None,
            None => self.base.position(key).map(|rank| self.base_value(rank)),
        }
    }

    fn put(&mut self, key: i64, value: V) -> Option<V> {
        let previous = self.get(key).cloned();
        self.overlay.insert(key, Pending::Put(value));
        previous
    }

    fn remove(&mut self, key: i64) -> Option<V> {
        let previous = self.get(key).cloned()?;
        if key != 0 && self.base.contains(key) {
            self.overlay.insert(key, Pending::Removed);
        } else {
            self.overlay.remove(&key);
        }
        Some(previous)
    }

    /// Base entries not shadowed by the overlay, ascending.
    fn base_entries(&self) -> impl Iterator<Item = (i64, &V)> + '_ {
        self.base
            .iter()
            .enumerate()
            .filter(|(_, key)| self.overlay.is_empty() || !self.overlay.contains_key(key))
            .map(|(rank, key)| (key, self.base_value(rank)))
    }

    /// Overlay puts, ascending.
    fn pending_entries(&self) -> Vec<(i64, &V)> {
        let mut pending: Vec<(i64, &V)> = self
            .overlay
            .iter()
            .filter_map(|(&key, entry)| match entry {
                Pending::Put(value) => Some((key, value)),
                Pending::Removed => None,
            })
            .collect();
        pending.sort_unstable_by_key(|&(key, _)| key);
        pending
    }

    fn entries(&self) -> impl Iterator<Item = (i64, &V)> + '_ {
        self.base_entries()
            .chain(self.overlay.iter().filter_map(|(&key, entry)| match entry {
                Pending::Put(value) => Some((key, value)),
                Pending::Removed => None,
            }))
    }

    fn sorted_keys(&self) -> Vec<i64> {
        if self.overlay.is_empty() {
            return self.base.to_vec();
        }
        let merged = MergeByKey::new(
            self.base_entries().map(|(key, _)| (key, ())),
            self.pending_entries().into_iter().map(|(key, _)| (key, ())),
        );
        merged.map(|(key, _)| key).collect()
    }

    /// Folds the overlay and a new bulk load into fresh dense rows.
    fn merge(&self, keys: Vec<i64>, value: V, options: &MapOptions) -> CollectionResult<Self> {
        let current = MergeByKey::new(
            self.base_entries().map(|(key, stored)| (key, stored.clone())),
            self.pending_entries()
                .into_iter()
                .map(|(key, stored)| (key, stored.clone())),
        );
        let incoming = keys.into_iter().map(|key| (key, value.clone()));

        let mut merged_keys = Vec::with_capacity(self.base.len() + self.overlay.len());
        let mut merged_values = Vec::with_capacity(merged_keys.capacity());
        let mut overlay = HashMap::new();
        for (key, stored) in MergeByKey::new(current, incoming) {
            if key == 0 {
                overlay.insert(0, Pending::Put(stored));
            } else {
                merged_keys.push(key);
                merged_values.push(stored);
            }
        }

        let chunks = chunk_values(merged_keys, &options.array_options)?;
        Ok(Self {
            base: LargeLongArray::from_sorted_chunks(chunks, Arc::clone(&options.array_options)),
            values: BaseValues::Dense(Arc::new(merged_values)),
            overlay,
        })
    }
}

/// Merges two ascending `(key, value)` streams; the right side wins ties.
struct MergeByKey<L: Iterator, R: Iterator> {
    left: Peekable<L>,
    right: Peekable<R>,
}

impl<T, L, R> MergeByKey<L, R>
where
    L: Iterator<Item = (i64, T)>,
    R: Iterator<Item = (i64, T)>,
{
    fn new(left: L, right: R) -> Self {
        Self {
            left: left.peekable(),
            right: right.peekable(),
        }
    }
}

impl<T, L, R> Iterator for MergeByKey<L, R>
where
    L: Iterator<Item = (i64, T)>,
    R: Iterator<Item = (i64, T)>,
{
    type Item = (i64, T);

    fn next(&mut self) -> Option<Self::Item> {
        let ordering = match (self.left.peek(), self.right.peek()) {
            (Some((left, _)), Some((right, _))) => left.cmp(right),
            (Some(_), None) => return self.left.next(),
            (None, _) => return self.right.next(),
        };
        match ordering {
            std::cmp::Ordering::Less => self.left.next(),
            std::cmp::Ordering::Greater => self.right.next(),
            std::cmp::Ordering::Equal => {
                self.left.next();
                self.right.next()
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Repr<V> {
    Lazy(LazyRows<V>),
    Materialized(Arc<HashMap<i64, V>>),
}

/// Long map that stays a sorted key array through bulk loads.
///
/// Lookups in lazy mode binary search the base keys. Scattered
/// [`put`](LongMap::put) and [`remove`](LongMap::remove) calls collect in an
/// overlay; once the overlay outgrows
/// [`MapOptions::scatter_limit`] the map materializes into a hash table and
/// stays one until [`clear`](LongMap::clear).
#[derive(Debug, Clone)]
pub struct DualModeLongMap<V> {
    repr: Repr<V>,
    len: usize,
    keys: KeyCache,
    options: Arc<MapOptions>,
}

impl<V: Clone> DualModeLongMap<V> {
    /// Creates an empty lazy map with default tuning.
    pub fn new() -> Self {
        Self::with_options(Arc::new(MapOptions::default()))
    }

    pub(crate) fn with_options(options: Arc<MapOptions>) -> Self {
        let mut keys = KeyCache::default();
        keys.reset_empty();
        Self {
            repr: Repr::Lazy(LazyRows::empty(&options)),
            len: 0,
            keys,
            options,
        }
    }

    /// Scattered writes waiting in the overlay; zero once materialized.
    pub fn pending_mutations(&self) -> usize {
        match &self.repr {
            Repr::Lazy(rows) => rows.overlay.len(),
            Repr::Materialized(_) => 0,
        }
    }

    /// Builds the hash table now. No-op when already materialized.
    pub fn materialize(&mut self) {
        let Repr::Lazy(rows) = &self.repr else {
            return;
        };
        let mut table = HashMap::with_capacity(self.len);
        table.extend(rows.entries().map(|(key, value)| (key, value.clone())));
        debug!(
            keys = table.len(),
            pending = rows.overlay.len(),
            "materialized long map"
        );
        self.repr = Repr::Materialized(Arc::new(table));
    }

    fn settle(&mut self) {
        if let Repr::Lazy(rows) = &self.repr
            && rows.overlay.len() > self.options.scatter_limit(rows.base.len())
        {
            self.materialize();
        }
    }

    fn materialized_keys(table: &HashMap<i64, V>) -> Vec<i64> {
        table.keys().copied().collect()
    }
}

impl<V: Clone> Default for DualModeLongMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> LongMap<V> for DualModeLongMap<V> {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, key: i64) -> Option<&V> {
        match &self.repr {
            Repr::Lazy(rows) => rows.get(key),
            Repr::Materialized(table) => table.get(&key),
        }
    }

    fn put(&mut self, key: i64, value: V) -> Option<V> {
        let previous = match &mut self.repr {
            Repr::Lazy(rows) => rows.put(key, value),
            Repr::Materialized(table) => Arc::make_mut(table).insert(key, value),
        };
        if previous.is_none() {
            self.len += 1;
            self.keys.invalidate();
        }
        self.settle();
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

        match &mut self.repr {
            Repr::Materialized(table) => {
                let table = Arc::make_mut(table);
                table.reserve(keys.len());
                for key in keys {
                    if table.insert(key, value.clone()).is_none() {
                        self.len += 1;
                    }
                }
            }
            Repr::Lazy(rows) if self.len == 0 => {
                self.len = keys.len();
                *rows = LazyRows::bulk(keys, value, &self.options)?;
            }
            Repr::Lazy(rows) => {
                let budget = self
                    .options
                    .scatter_limit(rows.base.len())
                    .saturating_sub(rows.overlay.len());
                if keys.len() <= budget {
                    for key in keys {
                        if rows.put(key, value.clone()).is_none() {
                            self.len += 1;
                        }
                    }
                } else {
                    let merged = rows.merge(keys, value, &self.options)?;
                    self.len = merged.base.len() + merged.overlay.len();
                    debug!(keys = self.len, "merged bulk load into lazy rows");
                    *rows = merged;
                }
            }
        }

        self.keys.invalidate();
        self.settle();
        Ok(())
    }

    fn remove(&mut self, key: i64) -> Option<V> {
        let removed = match &mut self.repr {
            Repr::Lazy(rows) => rows.remove(key),
            Repr::Materialized(table) => {
                if !table.contains_key(&key) {
                    return None;
                }
                Arc::make_mut(table).remove(&key)
            }
        };
        if removed.is_some() {
            self.len -= 1;
            self.keys.invalidate();
            self.settle();
        }
        removed
    }

    fn clear(&mut self) {
        self.repr = Repr::Lazy(LazyRows::empty(&self.options));
        self.len = 0;
        self.keys.reset_empty();
    }

    fn key_array(&self) -> Vec<i64> {
        if let Some(sorted) = self.keys.sorted() {
            return sorted.to_vec();
        }
        match &self.repr {
            Repr::Lazy(rows) => rows.sorted_keys(),
            Repr::Materialized(table) => Self::materialized_keys(table),
        }
    }

    fn sorted_key_array(&self) -> Arc<[i64]> {
        self.keys.sorted_or_init(|| match &self.repr {
            Repr::Lazy(rows) => rows.sorted_keys().into(),
            Repr::Materialized(table) => {
                let mut keys = Self::materialized_keys(table);
                keys.sort_unstable();
                keys.into()
            }
        })
    }

    fn brief_key_array(&self) -> Vec<i64> {
        match &self.repr {
            Repr::Lazy(rows) => rows
                .entries()
                .map(|(key, _)| key)
                .take(BRIEF_KEY_LIMIT)
                .collect(),
            Repr::Materialized(table) => table.keys().take(BRIEF_KEY_LIMIT).copied().collect(),
        }
    }

    fn key_data(&self) -> Arc<KeyData> {
        self.keys.data_or_init(|| match &self.repr {
            Repr::Lazy(rows) if rows.overlay.is_empty() => KeyData::new(rows.base.clone(), false),
            Repr::Lazy(rows) => KeyData::from_keys(rows.sorted_keys(), &self.options),
            Repr::Materialized(table) => {
                KeyData::from_keys(Self::materialized_keys(table), &self.options)
            }
        })
    }

    fn is_initialized(&self) -> bool {
        matches!(self.repr, Repr::Materialized(_))
    }

    fn is_key_array_sorted(&self) -> bool {
        match &self.repr {
            Repr::Lazy(_) => true,
            Repr::Materialized(_) => self.len <= 1 || self.keys.sorted().is_some(),
        }
    }

    fn iter(&self) -> LongMapIter<'_, V> {
        match &self.repr {
            Repr::Lazy(rows) => Box::new(rows.entries()),
            Repr::Materialized(table) => Box::new(table.iter().map(|(&key, value)| (key, value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_options() -> Arc<MapOptions> {
        Arc::new(MapOptions::new(4, false, 3, 16))
    }

    #[test]
    fn bulk_load_stays_lazy() {
        let mut map = DualModeLongMap::with_options(small_options());
        map.put_multi_rows((1..=20).collect(), 'a', KeyState::UniqueSorted)
            .unwrap();
        assert!(!map.is_initialized());
        assert_eq!(map.len(), 20);
        assert_eq!(map.get(17), Some(&'a'));
        assert_eq!(map.get(21), None);
        assert_eq!(map.key_data().segment_count(), 5);
    }

    #[test]
    fn overlay_overflow_materializes() {
        let mut map = DualModeLongMap::with_options(small_options());
        map.put_multi_rows(vec![10, 20, 30], 0u32, KeyState::UniqueSorted)
            .unwrap();
        for key in 1..=3 {
            map.put(key, 1);
        }
        assert!(!map.is_initialized());
        assert_eq!(map.pending_mutations(), 3);

        map.remove(20);
        assert!(map.is_initialized());
        assert_eq!(map.len(), 5);
        assert_eq!(map.get(20), None);
        assert_eq!(map.get(2), Some(&1));
    }

    #[test]
    fn large_second_bulk_load_merges_and_overrides() {
        let mut map = DualModeLongMap::with_options(small_options());
        map.put_multi_rows(vec![1, 3, 5], "old", KeyState::UniqueSorted)
            .unwrap();
        map.put(2, "scattered");
        map.put_multi_rows(vec![5, 0, 6, 7, 8], "new", KeyState::Unique)
            .unwrap();

        assert!(!map.is_initialized());
        assert_eq!(map.pending_mutations(), 1);
        assert_eq!(map.len(), 8);
        assert_eq!(map.get(5), Some(&"new"));
        assert_eq!(map.get(1), Some(&"old"));
        assert_eq!(map.get(0), Some(&"new"));
        assert_eq!(&*map.sorted_key_array(), &[0, 1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn removed_base_key_can_come_back() {
        let mut map = DualModeLongMap::new();
        map.put_multi_rows(vec![4, 8], 1, KeyState::UniqueSorted)
            .unwrap();
        assert_eq!(map.remove(4), Some(1));
        assert_eq!(map.remove(4), None);
        assert_eq!(map.put(4, 2), None);
        assert_eq!(map.get(4), Some(&2));
        assert_eq!(map.key_array(), vec![4, 8]);
    }
}
