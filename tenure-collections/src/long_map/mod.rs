//! Primitive long-keyed maps built for very large bulk loads.
//!
//! Two implementations coexist behind the [`LongMap`] trait:
//!
//! - [`EagerLongMap`] - always a hash table ([`LongMapVersion::Eager`])
//! - [`DualModeLongMap`] - keeps bulk loads as a sorted key array searched by
//!   binary search and only builds a hash table once enough scattered
//!   single-key mutations accumulate ([`LongMapVersion::DualMode`])
//!
//! [`HashLongMap`] is a tagged union over both. [`HashLongMap::create`] picks
//! the process-wide [`selected_version`], so a deployment can switch versions
//! for migration or benchmarking without touching call sites.
//!
//! ## Bulk loads
//!
//! [`LongMap::put_multi_rows`] associates many keys with one value. The
//! [`KeyState`] hint says how much work the map must do to order the keys:
//!
//! | Hint | Map does |
//! |------|----------|
//! | [`UniqueSorted`](KeyState::UniqueSorted) | verifies ascending order |
//! | [`Unique`](KeyState::Unique) | sorts |
//! | [`Unknown`](KeyState::Unknown) | sorts and deduplicates |
//!
//! With hint validation enabled a contradicted hint is rejected with
//! [`CollectionError::InvalidHint`]; otherwise the keys are silently repaired.

mod dual;
mod eager;
mod key_data;
mod shared;
mod version;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

pub use dual::DualModeLongMap;
pub use eager::EagerLongMap;
pub use key_data::KeyData;
pub use shared::SharedLongMap;
pub use version::{LongMapVersion, select_version, selected_version};

use crate::error::{CollectionError, CollectionResult};
use crate::long_array::ArrayOptions;

/// Maximum number of keys returned by [`LongMap::brief_key_array`].
pub const BRIEF_KEY_LIMIT: usize = 200;

/// Caller's promise about the keys handed to [`LongMap::put_multi_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// No duplicates, any order.
    Unique,
    /// No duplicates, strictly ascending.
    UniqueSorted,
    /// Nothing is known.
    Unknown,
}

/// Tuning shared by every map built from the same builder.
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub(crate) segment_size: usize,
    pub(crate) validate_hints: bool,
    pub(crate) min_scatter: usize,
    pub(crate) scatter_divisor: usize,
    pub(crate) array_options: Arc<ArrayOptions>,
}

impl MapOptions {
    const DEFAULT_SEGMENT_SIZE: usize = 1 << 16;
    const DEFAULT_MIN_SCATTER: usize = 1024;
    const DEFAULT_SCATTER_DIVISOR: usize = 16;

    fn new(
        segment_size: usize,
        validate_hints: bool,
        min_scatter: usize,
        scatter_divisor: usize,
    ) -> Self {
        let segment_size = segment_size.max(1);
        Self {
            segment_size,
            validate_hints,
            min_scatter,
            scatter_divisor: scatter_divisor.max(1),
            array_options: Arc::new(ArrayOptions {
                segment_size: Some(segment_size),
                ..ArrayOptions::default()
            }),
        }
    }

    /// Keys per segment of key arrays and [`KeyData`].
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Scattered mutations a lazy map of `base_len` keys absorbs before it
    /// materializes.
    pub fn scatter_limit(&self, base_len: usize) -> usize {
        self.min_scatter.max(base_len / self.scatter_divisor)
    }
}

impl Default for MapOptions {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_SEGMENT_SIZE,
            false,
            Self::DEFAULT_MIN_SCATTER,
            Self::DEFAULT_SCATTER_DIVISOR,
        )
    }
}

/// Boxed iterator over `(key, value)` pairs.
pub type LongMapIter<'a, V> = Box<dyn Iterator<Item = (i64, &'a V)> + 'a>;

/// Map from 64-bit keys to values of type `V`.
///
/// Missing keys are never an error: lookups return `None` and removals of
/// absent keys are no-ops.
pub trait LongMap<V> {
    /// Number of distinct live keys.
    fn len(&self) -> usize;

    /// Returns `true` if the map holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value stored under `key`.
    fn get(&self, key: i64) -> Option<&V>;

    /// Returns `true` if `key` is present.
    fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if any key maps to `value`.
    fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.iter().any(|(_, stored)| stored == value)
    }

    /// Inserts or replaces, returning the previous value.
    fn put(&mut self, key: i64, value: V) -> Option<V>;

    /// Associates every key in `keys` with `value`.
    fn put_multi_rows(&mut self, keys: Vec<i64>, value: V, state: KeyState)
    -> CollectionResult<()>;

    /// Removes `key`, returning its value if it was present.
    fn remove(&mut self, key: i64) -> Option<V>;

    /// Resets to an empty, trivially sorted map.
    fn clear(&mut self);

    /// All live keys in the map's current order.
    fn key_array(&self) -> Vec<i64>;

    /// All live keys in ascending order. The result is cached until the next
    /// structural mutation, so repeated calls are O(1).
    fn sorted_key_array(&self) -> Arc<[i64]>;

    /// At most [`BRIEF_KEY_LIMIT`] keys, for diagnostics on huge maps. Never
    /// forces materialization.
    fn brief_key_array(&self) -> Vec<i64>;

    /// Segmented view of the keys for streaming. The same `Arc` is returned
    /// until the next structural mutation.
    fn key_data(&self) -> Arc<KeyData>;

    /// Returns `true` once the map is backed by a hash table.
    fn is_initialized(&self) -> bool;

    /// Returns `true` when [`key_array`](Self::key_array) is known to be
    /// ascending. Always `true` for maps of zero or one key.
    fn is_key_array_sorted(&self) -> bool;

    /// Iterates over `(key, value)` pairs in unspecified order.
    fn iter(&self) -> LongMapIter<'_, V>;
}

/// Brings bulk-load keys into ascending, duplicate-free order as the hint
/// allows.
pub(crate) fn normalize_keys(
    mut keys: Vec<i64>,
    state: KeyState,
    validate: bool,
) -> CollectionResult<Vec<i64>> {
    let contradiction = match state {
        KeyState::UniqueSorted => keys.windows(2).position(|pair| pair[0] >= pair[1]),
        KeyState::Unique => {
            keys.sort_unstable();
            keys.windows(2).position(|pair| pair[0] == pair[1])
        }
        KeyState::Unknown => {
            keys.sort_unstable();
            keys.dedup();
            None
        }
    };

    if let Some(position) = contradiction {
        if validate {
            return Err(CollectionError::InvalidHint {
                hint: state,
                position: position + 1,
            });
        }
        debug!(?state, position = position + 1, "repairing contradicted key hint");
        keys.sort_unstable();
        keys.dedup();
    }
    Ok(keys)
}

/// Long-keyed map of the version selected at construction.
///
/// # Examples
///
/// ```
/// use tenure_collections::{HashLongMap, KeyState, LongMap, LongMapVersion};
///
/// let mut map = HashLongMap::builder()
///     .version(LongMapVersion::DualMode)
///     .build();
///
/// map.put_multi_rows((1..=1000).collect(), "bulk", KeyState::UniqueSorted)
///     .unwrap();
/// assert!(!map.is_initialized());
/// assert!(map.is_key_array_sorted());
///
/// assert_eq!(map.put(5000, "scattered"), None);
/// assert_eq!(map.get(10), Some(&"bulk"));
/// assert_eq!(map.len(), 1001);
/// ```
#[derive(Clone)]
pub enum HashLongMap<V> {
    /// Always a hash table.
    Eager(EagerLongMap<V>),
    /// Lazy sorted array until scattered mutations force a hash table.
    DualMode(DualModeLongMap<V>),
}

macro_rules! dispatch {
    ($self:expr, $map:ident => $body:expr) => {
        match $self {
            HashLongMap::Eager($map) => $body,
            HashLongMap::DualMode($map) => $body,
        }
    };
}

impl<V: Clone> HashLongMap<V> {
    /// Creates an empty map of the process-wide [`selected_version`].
    pub fn create() -> Self {
        HashLongMapBuilder::new().build()
    }

    /// Creates a builder for a map with non-default tuning.
    pub fn builder() -> HashLongMapBuilder<V> {
        HashLongMapBuilder::new()
    }

    /// Implementation version backing this map.
    pub fn version(&self) -> LongMapVersion {
        match self {
            Self::Eager(_) => LongMapVersion::Eager,
            Self::DualMode(_) => LongMapVersion::DualMode,
        }
    }
}

impl<V: Clone> Default for HashLongMap<V> {
    fn default() -> Self {
        Self::create()
    }
}

impl<V: Clone> LongMap<V> for HashLongMap<V> {
    fn len(&self) -> usize {
        dispatch!(self, map => map.len())
    }

    fn get(&self, key: i64) -> Option<&V> {
        dispatch!(self, map => map.get(key))
    }

    fn contains_key(&self, key: i64) -> bool {
        dispatch!(self, map => map.contains_key(key))
    }

    fn put(&mut self, key: i64, value: V) -> Option<V> {
        dispatch!(self, map => map.put(key, value))
    }

    fn put_multi_rows(
        &mut self,
        keys: Vec<i64>,
        value: V,
        state: KeyState,
    ) -> CollectionResult<()> {
        dispatch!(self, map => map.put_multi_rows(keys, value, state))
    }

    fn remove(&mut self, key: i64) -> Option<V> {
        dispatch!(self, map => map.remove(key))
    }

    fn clear(&mut self) {
        dispatch!(self, map => map.clear())
    }

    fn key_array(&self) -> Vec<i64> {
        dispatch!(self, map => map.key_array())
    }

    fn sorted_key_array(&self) -> Arc<[i64]> {
        dispatch!(self, map => map.sorted_key_array())
    }

    fn brief_key_array(&self) -> Vec<i64> {
        dispatch!(self, map => map.brief_key_array())
    }

    fn key_data(&self) -> Arc<KeyData> {
        dispatch!(self, map => map.key_data())
    }

    fn is_initialized(&self) -> bool {
        dispatch!(self, map => map.is_initialized())
    }

    fn is_key_array_sorted(&self) -> bool {
        dispatch!(self, map => map.is_key_array_sorted())
    }

    fn iter(&self) -> LongMapIter<'_, V> {
        dispatch!(self, map => map.iter())
    }
}

impl<V: Clone> fmt::Debug for HashLongMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashLongMap")
            .field("version", &self.version())
            .field("len", &self.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Builder for [`HashLongMap`].
pub struct HashLongMapBuilder<V> {
    version: Option<LongMapVersion>,
    segment_size: Option<usize>,
    validate_hints: bool,
    min_scatter: Option<usize>,
    scatter_divisor: Option<usize>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Default for HashLongMapBuilder<V> {
    fn default() -> Self {
        Self {
            version: None,
            segment_size: None,
            validate_hints: false,
            min_scatter: None,
            scatter_divisor: None,
            _value: PhantomData,
        }
    }
}

impl<V> Clone for HashLongMapBuilder<V> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            segment_size: self.segment_size,
            validate_hints: self.validate_hints,
            min_scatter: self.min_scatter,
            scatter_divisor: self.scatter_divisor,
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for HashLongMapBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashLongMapBuilder")
            .field("version", &self.version)
            .field("segment_size", &self.segment_size)
            .field("validate_hints", &self.validate_hints)
            .field("min_scatter", &self.min_scatter)
            .field("scatter_divisor", &self.scatter_divisor)
            .finish()
    }
}

impl<V: Clone> HashLongMapBuilder<V> {
    /// Creates a builder using the process-wide version and default tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the implementation version instead of using [`selected_version`].
    pub fn version(mut self, version: LongMapVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Keys per segment in key arrays. Clamped to at least 1.
    ///
    /// # Default
    ///
    /// 65536
    pub fn segment_size(mut self, size: usize) -> Self {
        self.segment_size = Some(size);
        self
    }

    /// Reject contradicted [`KeyState`] hints instead of repairing them.
    pub fn validate_hints(mut self, enabled: bool) -> Self {
        self.validate_hints = enabled;
        self
    }

    /// Minimum number of scattered mutations a lazy map absorbs before it
    /// materializes.
    ///
    /// # Default
    ///
    /// 1024
    pub fn min_scatter_threshold(mut self, threshold: usize) -> Self {
        self.min_scatter = Some(threshold);
        self
    }

    /// Large lazy maps absorb up to `base_len / divisor` scattered mutations
    /// when that exceeds the minimum. Clamped to at least 1.
    ///
    /// # Default
    ///
    /// 16
    pub fn scatter_divisor(mut self, divisor: usize) -> Self {
        self.scatter_divisor = Some(divisor);
        self
    }

    /// Builds an empty map.
    pub fn build(self) -> HashLongMap<V> {
        let options = Arc::new(MapOptions::new(
            self.segment_size
                .unwrap_or(MapOptions::DEFAULT_SEGMENT_SIZE),
            self.validate_hints,
            self.min_scatter.unwrap_or(MapOptions::DEFAULT_MIN_SCATTER),
            self.scatter_divisor
                .unwrap_or(MapOptions::DEFAULT_SCATTER_DIVISOR),
        ));
        match self.version.unwrap_or_else(selected_version) {
            LongMapVersion::Eager => HashLongMap::Eager(EagerLongMap::with_options(options)),
            LongMapVersion::DualMode => {
                HashLongMap::DualMode(DualModeLongMap::with_options(options))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_sorted_hint_is_repaired_without_validation() {
        let keys = normalize_keys(vec![3, 1, 2, 2], KeyState::UniqueSorted, false).unwrap();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn unique_hint_with_duplicates_is_rejected_under_validation() {
        let err = normalize_keys(vec![4, 2, 4], KeyState::Unique, true).unwrap_err();
        assert!(matches!(
            err,
            CollectionError::InvalidHint {
                hint: KeyState::Unique,
                ..
            }
        ));
    }

    #[test]
    fn scatter_limit_grows_with_base() {
        let options = MapOptions::default();
        assert_eq!(options.scatter_limit(10), 1024);
        assert_eq!(options.scatter_limit(1 << 20), (1 << 20) / 16);
    }
}
