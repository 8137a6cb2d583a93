use std::sync::{Arc, OnceLock};

use super::MapOptions;
use crate::long_array::LargeLongArray;

/// Segmented snapshot of a map's keys, for streaming huge key sets without
/// one contiguous allocation.
///
/// The zero key cannot live inside a [`LargeLongArray`], so it is tracked as
/// a flag and yielded first by [`iter`](Self::iter).
#[derive(Debug, Clone)]
pub struct KeyData {
    keys: LargeLongArray,
    zero: bool,
}

impl KeyData {
    pub(crate) fn new(keys: LargeLongArray, zero: bool) -> Self {
        Self { keys, zero }
    }

    /// Partitions `keys` (any order, unique) into segments of the map's size.
    pub(crate) fn from_keys(mut keys: Vec<i64>, options: &MapOptions) -> Self {
        let before = keys.len();
        keys.retain(|&key| key != 0);
        let zero = keys.len() != before;
        let chunks = if keys.len() > options.segment_size {
            keys.chunks(options.segment_size).map(<[i64]>::to_vec).collect()
        } else if keys.is_empty() {
            Vec::new()
        } else {
            vec![keys]
        };
        Self::new(
            LargeLongArray::from_chunks(chunks, Arc::clone(&options.array_options)),
            zero,
        )
    }

    /// Number of keys, the zero key included.
    pub fn len(&self) -> usize {
        self.keys.len() + usize::from(self.zero)
    }

    /// Returns `true` when there are no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when the zero key is present.
    pub fn contains_zero(&self) -> bool {
        self.zero
    }

    /// Non-zero keys as a segmented array.
    pub fn keys(&self) -> &LargeLongArray {
        &self.keys
    }

    /// Number of segments holding non-zero keys.
    pub fn segment_count(&self) -> usize {
        self.keys.segment_count()
    }

    /// Segment slices of the non-zero keys.
    pub fn segments(&self) -> impl Iterator<Item = &[i64]> + '_ {
        self.keys.segment_slices()
    }

    /// Every key, zero first when present.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.zero.then_some(0).into_iter().chain(self.keys.iter())
    }
}

/// Key views computed on demand and dropped on structural mutation.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyCache {
    sorted: OnceLock<Arc<[i64]>>,
    data: OnceLock<Arc<KeyData>>,
}

impl KeyCache {
    pub(crate) fn sorted(&self) -> Option<&Arc<[i64]>> {
        self.sorted.get()
    }

    pub(crate) fn sorted_or_init(&self, init: impl FnOnce() -> Arc<[i64]>) -> Arc<[i64]> {
        Arc::clone(self.sorted.get_or_init(init))
    }

    pub(crate) fn data_or_init(&self, init: impl FnOnce() -> KeyData) -> Arc<KeyData> {
        Arc::clone(self.data.get_or_init(|| Arc::new(init())))
    }

    pub(crate) fn invalidate(&mut self) {
        self.sorted = OnceLock::new();
        self.data = OnceLock::new();
    }

    /// Caches for an empty map.
    pub(crate) fn reset_empty(&mut self) {
        self.sorted = OnceLock::from(Arc::from(Vec::new()));
        self.data = OnceLock::new();
    }
}
