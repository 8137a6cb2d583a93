//! Segmented, growable array of 64-bit keys.
//!
//! [`LargeLongArray`] stores its values in an ordered list of segments so that
//! arrays with hundreds of millions of entries never need a single giant
//! reallocation. Zero is reserved as the empty-slot sentinel: removing a value
//! zeroes its slot, and [`sort`](LargeLongArray::sort) and
//! [`repack`](LargeLongArray::repack) drop sentinels from their output.
//!
//! ## Positions and live values
//!
//! Positional operations ([`get`](LargeLongArray::get),
//! [`set`](LargeLongArray::set)) address *slots*, including zeroed ones, so a
//! removal never shifts the position of other values.
//! [`len`](LargeLongArray::len) counts live (non-sentinel) values only.
//!
//! ## Sharing
//!
//! Each segment is an `Arc<Vec<i64>>`. Cloning an array is cheap and the clone
//! is an immutable snapshot: writes on either side copy the touched segment
//! first. The `input_shared` and `output_shared` builder options control how
//! caller-supplied buffers and returned buffers are aliased.

mod builder;
mod sort;

use std::fmt;
use std::sync::Arc;

pub use builder::{ArrayOptions, LongArrayBuilder, SanityHook, SegmentAllocation};
pub(crate) use sort::chunk_values;

use crate::error::{CollectionError, CollectionResult};

/// Minimum capacity reserved for a freshly allocated segment.
const MIN_SEGMENT_CAPACITY: usize = 16;

#[derive(Clone)]
pub(crate) struct Segment {
    values: Arc<Vec<i64>>,
    live: usize,
    /// Live values are strictly ascending.
    sorted: bool,
    /// Supplied by a caller that may still alias the buffer.
    borrowed: bool,
}

impl Segment {
    fn supplied(values: Arc<Vec<i64>>, borrowed: bool) -> Self {
        let live = values.iter().filter(|&&value| value != 0).count();
        let sorted = strictly_ascending(values.iter().copied());
        Self {
            values,
            live,
            sorted,
            borrowed,
        }
    }

    fn owned(values: Vec<i64>) -> Self {
        Self::supplied(Arc::new(values), false)
    }

    fn sorted_chunk(values: Vec<i64>) -> Self {
        Self {
            live: values.len(),
            values: Arc::new(values),
            sorted: true,
            borrowed: false,
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn first_live(&self) -> Option<i64> {
        self.values.iter().copied().find(|&value| value != 0)
    }

    fn last_live(&self) -> Option<i64> {
        self.values.iter().rev().copied().find(|&value| value != 0)
    }

    /// Nearest live values before and after `offset` inside this segment.
    fn neighbors(&self, offset: usize) -> (Option<i64>, Option<i64>) {
        let prev = self.values[..offset]
            .iter()
            .rev()
            .copied()
            .find(|&value| value != 0);
        let next = self.values[offset + 1..]
            .iter()
            .copied()
            .find(|&value| value != 0);
        (prev, next)
    }

    /// Mutable access to the slots, copying the buffer first when it is
    /// borrowed from a caller or shared with a snapshot.
    fn slots_mut(&mut self) -> &mut Vec<i64> {
        if self.borrowed {
            self.values = Arc::new(self.values.as_ref().clone());
            self.borrowed = false;
        }
        Arc::make_mut(&mut self.values)
    }

    fn compact(&mut self) {
        let values: Vec<i64> = self.values.iter().copied().filter(|&v| v != 0).collect();
        self.live = values.len();
        self.values = Arc::new(values);
        self.borrowed = false;
    }

    fn deep_copy(&self) -> Self {
        Self {
            values: Arc::new(self.values.as_ref().clone()),
            live: self.live,
            sorted: self.sorted,
            borrowed: false,
        }
    }
}

fn strictly_ascending(values: impl Iterator<Item = i64>) -> bool {
    let mut prev: Option<i64> = None;
    for value in values.filter(|&value| value != 0) {
        if prev.is_some_and(|prev| prev >= value) {
            return false;
        }
        prev = Some(value);
    }
    true
}

/// Compact, segment-based mutable collection of 64-bit keys.
///
/// # Examples
///
/// ```
/// use tenure_collections::LargeLongArray;
///
/// let mut array = LargeLongArray::builder().segment_size(3).build().unwrap();
/// for value in [30, 10, 20, 50, 40] {
///     array.append(value).unwrap();
/// }
///
/// assert!(array.remove(20));
/// assert_eq!(array.len(), 4);
/// assert_eq!(array.get(2).unwrap(), 0);
///
/// let sorted = array.sort().unwrap();
/// assert_eq!(sorted.to_vec(), vec![10, 30, 40, 50]);
/// ```
#[derive(Clone)]
pub struct LargeLongArray {
    segments: Vec<Segment>,
    /// First slot index of each segment.
    starts: Vec<usize>,
    slots: usize,
    live: usize,
    /// All live values are strictly ascending across segments.
    known_sorted: bool,
    sorted_cache: Option<Arc<LargeLongArray>>,
    options: Arc<ArrayOptions>,
}

impl LargeLongArray {
    /// Creates a new builder.
    pub fn builder() -> LongArrayBuilder {
        LongArrayBuilder::new()
    }

    /// Creates an empty array with one contiguous block and no validation.
    pub fn new() -> Self {
        Self::from_segments(Vec::new(), Arc::new(ArrayOptions::default()))
    }

    pub(crate) fn from_segments(segments: Vec<Segment>, options: Arc<ArrayOptions>) -> Self {
        let mut known_sorted = true;
        let mut prev_last: Option<i64> = None;
        for segment in &segments {
            if !segment.sorted {
                known_sorted = false;
                break;
            }
            if let (Some(prev), Some(first)) = (prev_last, segment.first_live())
                && prev >= first
            {
                known_sorted = false;
                break;
            }
            prev_last = segment.last_live().or(prev_last);
        }

        let mut array = Self {
            segments,
            starts: Vec::new(),
            slots: 0,
            live: 0,
            known_sorted,
            sorted_cache: None,
            options,
        };
        array.rebuild_index();
        array
    }

    /// Builds an array from ascending, sentinel-free chunks without
    /// re-validating their order.
    pub(crate) fn from_sorted_chunks(chunks: Vec<Vec<i64>>, options: Arc<ArrayOptions>) -> Self {
        let segments = chunks.into_iter().map(Segment::sorted_chunk).collect();
        let mut array = Self {
            segments,
            starts: Vec::new(),
            slots: 0,
            live: 0,
            known_sorted: true,
            sorted_cache: None,
            options,
        };
        array.rebuild_index();
        array
    }

    /// Builds an array from chunks in any order, detecting sortedness.
    pub(crate) fn from_chunks(chunks: Vec<Vec<i64>>, options: Arc<ArrayOptions>) -> Self {
        let segments = chunks.into_iter().map(Segment::owned).collect();
        Self::from_segments(segments, options)
    }

    fn rebuild_index(&mut self) {
        self.starts.clear();
        self.slots = 0;
        self.live = 0;
        for segment in &self.segments {
            self.starts.push(self.slots);
            self.slots += segment.len();
            self.live += segment.live;
        }
    }

    /// Options this array was built with.
    pub fn options(&self) -> &ArrayOptions {
        &self.options
    }

    /// Number of live (non-sentinel) values.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the array holds no live values.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of addressable positions, including zeroed slots.
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Number of segments currently allocated.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Slot count of every segment, in order.
    pub fn segment_lengths(&self) -> Vec<usize> {
        self.segments.iter().map(Segment::len).collect()
    }

    /// Returns `true` when live values are known to be strictly ascending.
    pub fn is_sorted(&self) -> bool {
        self.known_sorted
    }

    fn locate(&self, index: usize) -> CollectionResult<(usize, usize)> {
        if index >= self.slots {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.slots,
            });
        }
        let segment = self.starts.partition_point(|&start| start <= index) - 1;
        Ok((segment, index - self.starts[segment]))
    }

    fn value_at(&self, segment: usize, offset: usize) -> i64 {
        self.segments[segment].values[offset]
    }

    /// Value at `index`; zero for an emptied slot.
    pub fn get(&self, index: usize) -> CollectionResult<i64> {
        let (segment, offset) = self.locate(index)?;
        Ok(self.value_at(segment, offset))
    }

    /// Overwrites the slot at `index` and returns the previous value.
    ///
    /// On a sorted array with unique validation the write must keep live
    /// values strictly ascending.
    pub fn set(&mut self, index: usize, value: i64) -> CollectionResult<i64> {
        let (segment, offset) = self.locate(index)?;
        let old = self.value_at(segment, offset);
        if old == value {
            return Ok(old);
        }
        if value == 0 && self.options.rejects_zero() {
            return Err(CollectionError::ZeroValue);
        }

        let (seg_prev, seg_next) = self.segments[segment].neighbors(offset);
        let fits_segment =
            seg_prev.is_none_or(|prev| prev < value) && seg_next.is_none_or(|next| value < next);
        let prev = seg_prev.or_else(|| {
            self.segments[..segment]
                .iter()
                .rev()
                .find_map(Segment::last_live)
        });
        let next = seg_next.or_else(|| {
            self.segments[segment + 1..]
                .iter()
                .find_map(Segment::first_live)
        });
        let fits = prev.is_none_or(|prev| prev < value) && next.is_none_or(|next| value < next);

        if value != 0 {
            if self.known_sorted && self.options.validate_unique && !fits {
                return Err(CollectionError::OutOfOrder { index, value });
            }
            if self.options.validate_unique && self.contains(value) {
                return Err(CollectionError::Duplicate(value));
            }
            if self.options.assert_unique && self.segments[segment].values.contains(&value) {
                return Err(CollectionError::Duplicate(value));
            }
        }

        self.invalidate();
        let known_sorted = self.known_sorted;
        let target = &mut self.segments[segment];
        target.slots_mut()[offset] = value;
        match (old == 0, value == 0) {
            (true, false) => {
                target.live += 1;
                self.live += 1;
            }
            (false, true) => {
                target.live -= 1;
                self.live -= 1;
            }
            _ => {}
        }
        if value != 0 {
            target.sorted = target.sorted && fits_segment;
            self.known_sorted = known_sorted && fits;
        }
        Ok(old)
    }

    /// Appends `value` after the last slot, allocating a new segment when the
    /// current one is full.
    pub fn append(&mut self, value: i64) -> CollectionResult<()> {
        if value == 0 && self.options.rejects_zero() {
            return Err(CollectionError::ZeroValue);
        }
        if value != 0 {
            if self.options.validate_unique && self.contains(value) {
                return Err(CollectionError::Duplicate(value));
            }
            if self.options.assert_unique
                && self
                    .segments
                    .last()
                    .is_some_and(|tail| tail.values.contains(&value))
            {
                return Err(CollectionError::Duplicate(value));
            }
        }

        let needs_segment = match (self.segments.last(), self.options.segment_size) {
            (None, _) => true,
            (Some(tail), Some(limit)) => tail.len() >= limit,
            (Some(_), None) => false,
        };
        if needs_segment {
            let index = self.segments.len();
            let wanted = self
                .options
                .expected_capacity
                .saturating_sub(self.slots)
                .max(MIN_SEGMENT_CAPACITY);
            let capacity = self.options.segment_size.map_or(wanted, |limit| limit.min(wanted));
            let values = self.options.allocate(index, capacity)?;
            self.starts.push(self.slots);
            self.segments.push(Segment::owned(values));
        }

        self.invalidate();
        let global_last = self.last_live();
        let tail_index = self.segments.len() - 1;
        let tail = &mut self.segments[tail_index];
        if value != 0 {
            let tail_last = tail.last_live();
            tail.sorted = tail.sorted && tail_last.is_none_or(|last| last < value);
            self.known_sorted = self.known_sorted && global_last.is_none_or(|last| last < value);
            tail.live += 1;
            self.live += 1;
        }
        tail.slots_mut().push(value);
        self.slots += 1;
        Ok(())
    }

    /// Zeroes the first occurrence of `value`. Returns whether it was found.
    pub fn remove(&mut self, value: i64) -> bool {
        let Some(index) = self.position(value) else {
            return false;
        };
        let Ok((segment, offset)) = self.locate(index) else {
            return false;
        };
        self.invalidate();
        let target = &mut self.segments[segment];
        target.slots_mut()[offset] = 0;
        target.live -= 1;
        self.live -= 1;
        true
    }

    /// Overwrites the first occurrence of `old` with `new`.
    ///
    /// Returns `Ok(false)` when `old` is absent. The write is validated like
    /// [`set`](Self::set).
    pub fn replace(&mut self, old: i64, new: i64) -> CollectionResult<bool> {
        match self.position(old) {
            Some(index) => self.set(index, new).map(|_| true),
            None => Ok(false),
        }
    }

    /// Returns `true` if `value` is a live value of the array.
    pub fn contains(&self, value: i64) -> bool {
        self.position(value).is_some()
    }

    /// Slot index of the first occurrence of a live `value`.
    ///
    /// Sorted arrays are binary searched; otherwise this is a linear scan.
    pub fn position(&self, value: i64) -> Option<usize> {
        if value == 0 {
            return None;
        }
        if self.known_sorted && self.live == self.slots {
            return self.dense_search(value);
        }
        if self.known_sorted {
            for (index, segment) in self.segments.iter().enumerate() {
                match segment.last_live() {
                    Some(last) if last >= value => {
                        let offset = if segment.live == segment.len() {
                            segment.values.binary_search(&value).ok()
                        } else {
                            segment.values.iter().position(|&v| v == value)
                        };
                        return offset.map(|offset| self.starts[index] + offset);
                    }
                    _ => continue,
                }
            }
            return None;
        }
        self.segments
            .iter()
            .zip(&self.starts)
            .find_map(|(segment, &start)| {
                segment
                    .values
                    .iter()
                    .position(|&v| v == value)
                    .map(|offset| start + offset)
            })
    }

    /// Binary search over the global slot space of a sorted, gap-free array.
    fn dense_search(&self, value: i64) -> Option<usize> {
        let (mut low, mut high) = (0, self.slots);
        while low < high {
            let mid = low + (high - low) / 2;
            let segment = self.starts.partition_point(|&start| start <= mid) - 1;
            let probe = self.value_at(segment, mid - self.starts[segment]);
            match probe.cmp(&value) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    fn last_live(&self) -> Option<i64> {
        self.segments.iter().rev().find_map(Segment::last_live)
    }

    /// Live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.segment_slices()
            .flat_map(|slice| slice.iter().copied())
            .filter(|&value| value != 0)
    }

    /// Live values in slot order, collected.
    pub fn to_vec(&self) -> Vec<i64> {
        let mut values = Vec::with_capacity(self.live);
        values.extend(self.iter());
        values
    }

    /// Raw segment slices, sentinels included.
    pub fn segment_slices(&self) -> impl Iterator<Item = &[i64]> + '_ {
        self.segments.iter().map(|segment| segment.values.as_slice())
    }

    /// Segment buffers, sentinels included.
    ///
    /// With `output_shared` the buffers are fresh copies; otherwise they alias
    /// the array's own storage (writes to the array will copy first).
    pub fn segment_data(&self) -> Vec<Arc<Vec<i64>>> {
        self.segments
            .iter()
            .map(|segment| {
                if self.options.output_shared {
                    Arc::new(segment.values.as_ref().clone())
                } else {
                    Arc::clone(&segment.values)
                }
            })
            .collect()
    }

    /// Independent copy that shares no storage with `self`.
    pub fn deep_copy(&self) -> Self {
        Self {
            segments: self.segments.iter().map(Segment::deep_copy).collect(),
            starts: self.starts.clone(),
            slots: self.slots,
            live: self.live,
            known_sorted: self.known_sorted,
            sorted_cache: None,
            options: Arc::clone(&self.options),
        }
    }

    fn invalidate(&mut self) {
        self.sorted_cache = None;
    }
}

impl Default for LargeLongArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for LargeLongArray {
    fn eq(&self, other: &Self) -> bool {
        self.live == other.live && self.iter().eq(other.iter())
    }
}

impl Eq for LargeLongArray {}

impl fmt::Debug for LargeLongArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargeLongArray")
            .field("len", &self.live)
            .field("slots", &self.slots)
            .field("segments", &self.segments.len())
            .field("sorted", &self.known_sorted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_skips_empty_segments() {
        let array = LargeLongArray::builder()
            .segment(vec![1, 2, 3])
            .segment(Vec::new())
            .segment(Vec::new())
            .segment(vec![4])
            .build()
            .unwrap();

        assert_eq!(array.locate(3).unwrap(), (3, 0));
        assert_eq!(array.get(2).unwrap(), 3);
        assert_eq!(array.get(3).unwrap(), 4);
    }

    #[test]
    fn sortedness_tracks_appends() {
        let mut array = LargeLongArray::new();
        array.append(1).unwrap();
        array.append(5).unwrap();
        assert!(array.is_sorted());
        array.append(0).unwrap();
        assert!(array.is_sorted());
        array.append(3).unwrap();
        assert!(!array.is_sorted());
    }

    #[test]
    fn sorted_position_with_gaps_falls_back_per_segment() {
        let mut array = LargeLongArray::builder()
            .segment(vec![1, 2, 3])
            .segment(vec![4, 5, 6])
            .build()
            .unwrap();
        assert!(array.remove(2));
        assert_eq!(array.position(3), Some(2));
        assert_eq!(array.position(5), Some(4));
        assert_eq!(array.position(2), None);
    }
}
